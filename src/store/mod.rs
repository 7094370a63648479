//! Narrow interfaces onto the data the consensus engine reads and writes.
//!
//! Groups and restaurants belong to other services; this crate only reads
//! them. Suggestions and push tokens are owned here.

use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    common::identity::Identity,
    db::{
        restaurant::Restaurant,
        suggestion::{NewSuggestion, Suggestion},
    },
    mongodb::Id,
};

mod mongo;
#[cfg(test)]
mod memory;

pub use mongo::MongoBackend;
#[cfg(test)]
pub use memory::MemoryBackend;

/// Read access to group membership.
#[rocket::async_trait]
pub trait Membership: Send + Sync {
    /// Members of the group. `NotFound` if the group does not exist.
    async fn members(&self, group_id: Id) -> Result<Vec<Identity>>;

    async fn is_member(&self, group_id: Id, identity: &Identity) -> Result<bool> {
        Ok(self.members(group_id).await?.contains(identity))
    }

    async fn member_count(&self, group_id: Id) -> Result<usize> {
        Ok(self.members(group_id).await?.len())
    }
}

/// Read access to the restaurant catalog.
#[rocket::async_trait]
pub trait Catalog: Send + Sync {
    async fn get(&self, restaurant_id: Id) -> Result<Option<Restaurant>>;

    async fn exists(&self, restaurant_id: Id) -> Result<bool> {
        Ok(self.get(restaurant_id).await?.is_some())
    }
}

/// Persistence for suggestions and the group's list of them.
#[rocket::async_trait]
pub trait SuggestionStore: Send + Sync {
    /// Insert a suggestion and append it to its group's suggestion list.
    /// `Conflict` if the group already has a suggestion for the restaurant.
    async fn insert(&self, suggestion: NewSuggestion) -> Result<Suggestion>;

    async fn get(&self, suggestion_id: Id) -> Result<Option<Suggestion>>;

    async fn find_for_restaurant(
        &self,
        group_id: Id,
        restaurant_id: Id,
    ) -> Result<Option<Suggestion>>;

    /// All suggestions of a group, in the group's suggestion-list order.
    async fn list(&self, group_id: Id) -> Result<Vec<Suggestion>>;

    /// Overwrite a suggestion, provided its stored revision is still
    /// `expected_revision`. Returns false if someone else wrote first.
    async fn replace(&self, suggestion: &Suggestion, expected_revision: i64) -> Result<bool>;

    /// Delete a suggestion and drop it from its group's suggestion list.
    /// Returns false if there was nothing to delete.
    async fn remove(&self, group_id: Id, suggestion_id: Id) -> Result<bool>;
}

/// Registry of members' push notification tokens.
#[rocket::async_trait]
pub trait PushTokenStore: Send + Sync {
    /// Register (or replace) the push token for a member.
    async fn set_token(&self, identity: &Identity, token: &str) -> Result<()>;

    /// The registered tokens of the given members. Members without a token
    /// are skipped.
    async fn tokens_for(&self, identities: &[Identity]) -> Result<Vec<String>>;
}

pub type PushTokens = Arc<dyn PushTokenStore>;
