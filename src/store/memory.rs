use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::model::{
    common::identity::Identity,
    db::{
        group::Group,
        restaurant::Restaurant,
        suggestion::{NewSuggestion, Suggestion},
    },
    mongodb::Id,
};

use super::{Catalog, Membership, PushTokenStore, SuggestionStore};

#[derive(Default)]
struct State {
    groups: HashMap<Id, Group>,
    restaurants: HashMap<Id, Restaurant>,
    suggestions: HashMap<Id, Suggestion>,
    push_tokens: HashMap<Identity, String>,
}

/// An in-process backend for tests. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test must not poison the state for its assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a group with the given members.
    pub fn add_group(&self, members: &[&str]) -> Id {
        let group = Group {
            id: Id::new(),
            members: members.iter().map(|m| Identity::from(*m)).collect(),
            suggestions: Vec::new(),
        };
        let id = group.id;
        self.lock().groups.insert(id, group);
        id
    }

    /// Replace a group's members.
    pub fn set_members(&self, group_id: Id, members: &[&str]) {
        if let Some(group) = self.lock().groups.get_mut(&group_id) {
            group.members = members.iter().map(|m| Identity::from(*m)).collect();
        }
    }

    pub fn add_restaurant(&self, name: &str) -> Id {
        let restaurant = Restaurant {
            id: Id::new(),
            name: name.to_string(),
        };
        let id = restaurant.id;
        self.lock().restaurants.insert(id, restaurant);
        id
    }

    pub fn group(&self, group_id: Id) -> Option<Group> {
        self.lock().groups.get(&group_id).cloned()
    }

    pub fn suggestion(&self, suggestion_id: Id) -> Option<Suggestion> {
        self.lock().suggestions.get(&suggestion_id).cloned()
    }

    pub fn token(&self, identity: &str) -> Option<String> {
        self.lock().push_tokens.get(&Identity::from(identity)).cloned()
    }
}

#[rocket::async_trait]
impl Membership for MemoryBackend {
    async fn members(&self, group_id: Id) -> Result<Vec<Identity>> {
        self.lock()
            .groups
            .get(&group_id)
            .map(|group| group.members.clone())
            .ok_or_else(|| Error::not_found(format!("Group with ID '{group_id}'")))
    }
}

#[rocket::async_trait]
impl Catalog for MemoryBackend {
    async fn get(&self, restaurant_id: Id) -> Result<Option<Restaurant>> {
        Ok(self.lock().restaurants.get(&restaurant_id).cloned())
    }
}

#[rocket::async_trait]
impl SuggestionStore for MemoryBackend {
    async fn insert(&self, suggestion: NewSuggestion) -> Result<Suggestion> {
        let mut state = self.lock();
        let duplicate = state.suggestions.values().any(|existing| {
            existing.group_id == suggestion.group_id
                && existing.restaurant_id == suggestion.restaurant_id
        });
        if duplicate {
            return Err(Error::conflict(
                "Restaurant has already been suggested to this group",
            ));
        }

        let suggestion = Suggestion {
            id: Id::new(),
            suggestion,
        };
        let group = state
            .groups
            .get_mut(&suggestion.group_id)
            .ok_or_else(|| Error::not_found(format!("Group with ID '{}'", suggestion.group_id)))?;
        group.suggestions.push(suggestion.id);
        state.suggestions.insert(suggestion.id, suggestion.clone());
        Ok(suggestion)
    }

    async fn get(&self, suggestion_id: Id) -> Result<Option<Suggestion>> {
        Ok(self.suggestion(suggestion_id))
    }

    async fn find_for_restaurant(
        &self,
        group_id: Id,
        restaurant_id: Id,
    ) -> Result<Option<Suggestion>> {
        Ok(self
            .lock()
            .suggestions
            .values()
            .find(|s| s.group_id == group_id && s.restaurant_id == restaurant_id)
            .cloned())
    }

    async fn list(&self, group_id: Id) -> Result<Vec<Suggestion>> {
        let state = self.lock();
        let group = state
            .groups
            .get(&group_id)
            .ok_or_else(|| Error::not_found(format!("Group with ID '{group_id}'")))?;
        Ok(group
            .suggestions
            .iter()
            .filter_map(|id| state.suggestions.get(id).cloned())
            .collect())
    }

    async fn replace(&self, suggestion: &Suggestion, expected_revision: i64) -> Result<bool> {
        let mut state = self.lock();
        match state.suggestions.get_mut(&suggestion.id) {
            Some(stored) if stored.revision == expected_revision => {
                *stored = suggestion.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, group_id: Id, suggestion_id: Id) -> Result<bool> {
        let mut state = self.lock();
        let belongs = state
            .suggestions
            .get(&suggestion_id)
            .map_or(false, |s| s.group_id == group_id);
        if !belongs {
            return Ok(false);
        }
        state.suggestions.remove(&suggestion_id);
        if let Some(group) = state.groups.get_mut(&group_id) {
            group.suggestions.retain(|id| *id != suggestion_id);
        }
        Ok(true)
    }
}

#[rocket::async_trait]
impl PushTokenStore for MemoryBackend {
    async fn set_token(&self, identity: &Identity, token: &str) -> Result<()> {
        self.lock()
            .push_tokens
            .insert(identity.clone(), token.to_string());
        Ok(())
    }

    async fn tokens_for(&self, identities: &[Identity]) -> Result<Vec<String>> {
        let state = self.lock();
        Ok(identities
            .iter()
            .filter_map(|identity| state.push_tokens.get(identity).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn membership_queries() {
        let backend = MemoryBackend::new();
        let group = backend.add_group(&["ann@example.com", "bob@example.com"]);

        assert_eq!(backend.member_count(group).await.unwrap(), 2);
        assert!(backend.is_member(group, &Identity::from("bob@example.com")).await.unwrap());
        assert!(!backend.is_member(group, &Identity::from("zed@example.com")).await.unwrap());
        assert!(matches!(
            backend.member_count(Id::new()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn catalog_lookup() {
        let backend = MemoryBackend::new();
        let restaurant = backend.add_restaurant("Luigi's");

        assert!(backend.exists(restaurant).await.unwrap());
        assert!(!backend.exists(Id::new()).await.unwrap());
    }

    #[rocket::async_test]
    async fn tokens_skip_unregistered_members() {
        let backend = MemoryBackend::new();
        backend
            .set_token(&Identity::from("ann@example.com"), "ExponentPushToken[ann]")
            .await
            .unwrap();

        let tokens = backend
            .tokens_for(&[
                Identity::from("ann@example.com"),
                Identity::from("bob@example.com"),
            ])
            .await
            .unwrap();
        assert_eq!(tokens, vec!["ExponentPushToken[ann]".to_string()]);
    }

    #[rocket::async_test]
    async fn stale_revision_is_rejected() {
        let backend = MemoryBackend::new();
        let group = backend.add_group(&["ann@example.com"]);
        let restaurant = backend.add_restaurant("Luigi's");
        let mut suggestion = backend
            .insert(NewSuggestion::new(
                group,
                restaurant,
                "Luigi's".to_string(),
                Identity::from("ann@example.com"),
            ))
            .await
            .unwrap();

        suggestion.revision = 1;
        assert!(backend.replace(&suggestion, 0).await.unwrap());
        // Somebody else already moved it past revision 0.
        assert!(!backend.replace(&suggestion, 0).await.unwrap());
        assert_eq!(backend.suggestion(suggestion.id).unwrap().revision, 1);
    }
}
