use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    group::Group,
    push_token::PushToken,
    restaurant::Restaurant,
    suggestion::{NewSuggestion, Suggestion},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Group collection, owned by the membership service.
impl MongoCollection for Group {
    const NAME: &'static str = "groups";
}

// Restaurant collection, owned by the catalog service.
impl MongoCollection for Restaurant {
    const NAME: &'static str = "restaurants";
}

// Suggestion collections
const SUGGESTIONS: &str = "suggestions";
impl MongoCollection for Suggestion {
    const NAME: &'static str = SUGGESTIONS;
}
impl MongoCollection for NewSuggestion {
    const NAME: &'static str = SUGGESTIONS;
}

// Push token collection
impl MongoCollection for PushToken {
    const NAME: &'static str = "push_tokens";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // At most one active suggestion per restaurant per group.
    let suggestion_index = IndexModel::builder()
        .keys(doc! {"group_id": 1, "restaurant_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Suggestion>::from_db(db)
        .create_index(suggestion_index, None)
        .await?;

    // One push token per identity.
    let token_index = IndexModel::builder()
        .keys(doc! {"identity": 1})
        .options(unique)
        .build();
    Coll::<PushToken>::from_db(db)
        .create_index(token_index, None)
        .await?;

    Ok(())
}
