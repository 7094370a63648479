use std::collections::HashMap;

use chrono::Utc;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::UpdateOptions,
    Client, Database,
};
use rocket::{
    futures::TryStreamExt,
    http::Status,
};

use crate::error::{Error, Result};
use crate::model::{
    common::identity::Identity,
    db::{
        group::Group,
        push_token::PushToken,
        restaurant::Restaurant,
        suggestion::{NewSuggestion, Suggestion},
    },
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::{Catalog, Membership, PushTokenStore, SuggestionStore};

/// The production backend: every store interface over one MongoDB database.
#[derive(Clone)]
pub struct MongoBackend {
    client: Client,
    groups: Coll<Group>,
    restaurants: Coll<Restaurant>,
    suggestions: Coll<Suggestion>,
    new_suggestions: Coll<NewSuggestion>,
    push_tokens: Coll<PushToken>,
}

impl MongoBackend {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            groups: Coll::from_db(db),
            restaurants: Coll::from_db(db),
            suggestions: Coll::from_db(db),
            new_suggestions: Coll::from_db(db),
            push_tokens: Coll::from_db(db),
        }
    }

    async fn group(&self, group_id: Id) -> Result<Group> {
        self.groups
            .find_one(group_id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Group with ID '{group_id}'")))
    }
}

#[rocket::async_trait]
impl Membership for MongoBackend {
    async fn members(&self, group_id: Id) -> Result<Vec<Identity>> {
        Ok(self.group(group_id).await?.members)
    }
}

#[rocket::async_trait]
impl Catalog for MongoBackend {
    async fn get(&self, restaurant_id: Id) -> Result<Option<Restaurant>> {
        Ok(self
            .restaurants
            .find_one(restaurant_id.as_doc(), None)
            .await?)
    }
}

#[rocket::async_trait]
impl SuggestionStore for MongoBackend {
    async fn insert(&self, suggestion: NewSuggestion) -> Result<Suggestion> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        // Insert the suggestion; the unique index rejects a second one for
        // the same restaurant.
        let inserted = match self
            .new_suggestions
            .insert_one_with_session(&suggestion, None, &mut session)
            .await
        {
            Ok(inserted) => inserted,
            Err(err) if is_duplicate_key_error(&err) => {
                return Err(Error::conflict(
                    "Restaurant has already been suggested to this group",
                ))
            }
            Err(err) => return Err(err.into()),
        };
        let id: Id = inserted
            .inserted_id
            .as_object_id()
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    "Inserted suggestion has no object ID".to_string(),
                )
            })?
            .into();

        // Attach it to the group.
        let attached = self
            .groups
            .update_one_with_session(
                suggestion.group_id.as_doc(),
                doc! { "$push": { "suggestions": id } },
                None,
                &mut session,
            )
            .await?;
        if attached.matched_count == 0 {
            // Dropping the session aborts the transaction.
            return Err(Error::not_found(format!(
                "Group with ID '{}'",
                suggestion.group_id
            )));
        }

        session.commit_transaction().await?;
        Ok(Suggestion { id, suggestion })
    }

    async fn get(&self, suggestion_id: Id) -> Result<Option<Suggestion>> {
        Ok(self
            .suggestions
            .find_one(suggestion_id.as_doc(), None)
            .await?)
    }

    async fn find_for_restaurant(
        &self,
        group_id: Id,
        restaurant_id: Id,
    ) -> Result<Option<Suggestion>> {
        let filter = doc! {
            "group_id": group_id,
            "restaurant_id": restaurant_id,
        };
        Ok(self.suggestions.find_one(filter, None).await?)
    }

    async fn list(&self, group_id: Id) -> Result<Vec<Suggestion>> {
        let group = self.group(group_id).await?;

        let filter = doc! { "_id": { "$in": group.suggestions.clone() } };
        let mut found: HashMap<Id, Suggestion> = self
            .suggestions
            .find(filter, None)
            .await?
            .map_ok(|suggestion| (suggestion.id, suggestion))
            .try_collect()
            .await?;

        // Keep the group's ordering; skip any dangling references.
        Ok(group
            .suggestions
            .iter()
            .filter_map(|id| found.remove(id))
            .collect())
    }

    async fn replace(&self, suggestion: &Suggestion, expected_revision: i64) -> Result<bool> {
        let filter = doc! {
            "_id": suggestion.id,
            "revision": expected_revision,
        };
        let result = self.suggestions.replace_one(filter, suggestion, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn remove(&self, group_id: Id, suggestion_id: Id) -> Result<bool> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let filter = doc! {
            "_id": suggestion_id,
            "group_id": group_id,
        };
        let deleted = self
            .suggestions
            .delete_one_with_session(filter, None, &mut session)
            .await?;
        if deleted.deleted_count == 0 {
            return Ok(false);
        }

        self.groups
            .update_one_with_session(
                group_id.as_doc(),
                doc! { "$pull": { "suggestions": suggestion_id } },
                None,
                &mut session,
            )
            .await?;

        session.commit_transaction().await?;
        Ok(true)
    }
}

#[rocket::async_trait]
impl PushTokenStore for MongoBackend {
    async fn set_token(&self, identity: &Identity, token: &str) -> Result<()> {
        let upsert = UpdateOptions::builder().upsert(true).build();
        let update = doc! {
            "$set": {
                "token": token,
                "updated_at": BsonDateTime::from_chrono(Utc::now()),
            }
        };
        self.push_tokens
            .update_one(doc! { "identity": identity.as_str() }, update, upsert)
            .await?;
        Ok(())
    }

    async fn tokens_for(&self, identities: &[Identity]) -> Result<Vec<String>> {
        let wanted: Vec<&str> = identities.iter().map(Identity::as_str).collect();
        let tokens = self
            .push_tokens
            .find(doc! { "identity": { "$in": wanted } }, None)
            .await?
            .map_ok(|token| token.token)
            .try_collect()
            .await?;
        Ok(tokens)
    }
}

/// Setup helpers mirroring the in-memory backend's.
#[cfg(test)]
impl MongoBackend {
    /// Create a group with the given members.
    pub async fn add_group(&self, members: &[&str]) -> Id {
        let group = Group {
            id: Id::new(),
            members: members.iter().map(|m| Identity::from(*m)).collect(),
            suggestions: Vec::new(),
        };
        self.groups.insert_one(&group, None).await.unwrap();
        group.id
    }

    pub async fn add_restaurant(&self, name: &str) -> Id {
        let restaurant = Restaurant {
            id: Id::new(),
            name: name.to_string(),
        };
        self.restaurants.insert_one(&restaurant, None).await.unwrap();
        restaurant.id
    }

    pub async fn stored_group(&self, group_id: Id) -> Group {
        self.group(group_id).await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mongodb::Database;

    use super::*;

    const ANN: &str = "ann@example.com";
    const BOB: &str = "bob.smith@example.co.uk";

    fn new_suggestion(group_id: Id, restaurant_id: Id) -> NewSuggestion {
        NewSuggestion::new(
            group_id,
            restaurant_id,
            "Luigi's".to_string(),
            Identity::from(ANN),
        )
    }

    async fn stored(backend: &MongoBackend, suggestion_id: Id) -> Option<Suggestion> {
        SuggestionStore::get(backend, suggestion_id).await.unwrap()
    }

    #[backend_test(mongo)]
    async fn insert_attaches_to_group(backend: MongoBackend) {
        let group = backend.add_group(&[ANN, BOB]).await;
        let restaurant = backend.add_restaurant("Luigi's").await;

        let suggestion = backend
            .insert(new_suggestion(group, restaurant))
            .await
            .unwrap();
        assert_eq!(backend.stored_group(group).await.suggestions, vec![suggestion.id]);

        let found = stored(&backend, suggestion.id).await.unwrap();
        assert_eq!(found.group_id, group);
        assert_eq!(found.restaurant_id, restaurant);
        assert_eq!(found.restaurant_name, "Luigi's");
        assert_eq!(found.recommender, Identity::from(ANN));
        assert_eq!(found.revision, 0);

        let by_restaurant = backend
            .find_for_restaurant(group, restaurant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_restaurant.id, suggestion.id);
    }

    #[backend_test(mongo)]
    async fn duplicate_insert_conflicts(backend: MongoBackend, db: Database) {
        let group = backend.add_group(&[ANN]).await;
        let restaurant = backend.add_restaurant("Luigi's").await;
        let first = backend
            .insert(new_suggestion(group, restaurant))
            .await
            .unwrap();

        let again = backend.insert(new_suggestion(group, restaurant)).await;
        assert!(matches!(again, Err(Error::Conflict(_))));

        assert_eq!(backend.stored_group(group).await.suggestions, vec![first.id]);
        let count = Coll::<Suggestion>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[backend_test(mongo)]
    async fn insert_into_missing_group_rolls_back(backend: MongoBackend) {
        let group = Id::new();
        let restaurant = backend.add_restaurant("Luigi's").await;

        let orphan = backend.insert(new_suggestion(group, restaurant)).await;
        assert!(matches!(orphan, Err(Error::NotFound(_))));
        assert!(backend
            .find_for_restaurant(group, restaurant)
            .await
            .unwrap()
            .is_none());
    }

    #[backend_test(mongo)]
    async fn replace_requires_current_revision(backend: MongoBackend) {
        let group = backend.add_group(&[ANN, BOB]).await;
        let restaurant = backend.add_restaurant("Luigi's").await;
        let mut suggestion = backend
            .insert(new_suggestion(group, restaurant))
            .await
            .unwrap();

        let bob = Identity::from(BOB);
        let date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        suggestion.add_voter(&bob);
        assert!(suggestion.close_if_quorum(1));
        suggestion.set_availability(&bob, [date]).unwrap();
        suggestion.revision = 1;

        assert!(backend.replace(&suggestion, 0).await.unwrap());
        // The stored revision has moved on.
        assert!(!backend.replace(&suggestion, 0).await.unwrap());

        let found = stored(&backend, suggestion.id).await.unwrap();
        assert_eq!(found.revision, 1);
        assert!(found.closed);
        assert_eq!(found.voters, suggestion.voters);
        // Identities with dots survive as map keys.
        assert_eq!(found.availabilities, suggestion.availabilities);
    }

    #[backend_test(mongo)]
    async fn remove_detaches_from_group(backend: MongoBackend) {
        let group = backend.add_group(&[ANN]).await;
        let luigis = backend.add_restaurant("Luigi's").await;
        let sushi = backend.add_restaurant("Sushi Bar").await;
        let first = backend.insert(new_suggestion(group, luigis)).await.unwrap();
        let second = backend.insert(new_suggestion(group, sushi)).await.unwrap();

        // Only through its own group.
        assert!(!backend.remove(Id::new(), first.id).await.unwrap());
        assert!(stored(&backend, first.id).await.is_some());

        assert!(backend.remove(group, first.id).await.unwrap());
        assert!(stored(&backend, first.id).await.is_none());
        assert_eq!(backend.stored_group(group).await.suggestions, vec![second.id]);

        assert!(!backend.remove(group, first.id).await.unwrap());

        // The restaurant can be suggested again.
        backend.insert(new_suggestion(group, luigis)).await.unwrap();
    }

    #[backend_test(mongo)]
    async fn list_follows_group_order(backend: MongoBackend, db: Database) {
        let group = backend.add_group(&[ANN]).await;
        let mut ids = Vec::new();
        for name in ["Luigi's", "Sushi Bar", "Taco Stand"] {
            let restaurant = backend.add_restaurant(name).await;
            let suggestion = backend
                .insert(new_suggestion(group, restaurant))
                .await
                .unwrap();
            ids.push(suggestion.id);
        }

        let listed: Vec<Id> = backend.list(group).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(listed, ids);

        // Reorder the group's list and leave a dangling reference in it.
        let reordered = vec![ids[2], Id::new(), ids[0], ids[1]];
        Coll::<Group>::from_db(&db)
            .update_one(
                group.as_doc(),
                doc! { "$set": { "suggestions": reordered } },
                None,
            )
            .await
            .unwrap();
        let listed: Vec<Id> = backend.list(group).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![ids[2], ids[0], ids[1]]);

        assert!(matches!(backend.list(Id::new()).await, Err(Error::NotFound(_))));
    }

    #[backend_test(mongo)]
    async fn push_tokens_are_upserted(backend: MongoBackend) {
        let ann = Identity::from(ANN);
        let bob = Identity::from(BOB);
        backend.set_token(&ann, "ExponentPushToken[old]").await.unwrap();
        backend.set_token(&ann, "ExponentPushToken[new]").await.unwrap();
        backend.set_token(&bob, "ExponentPushToken[bob]").await.unwrap();

        let mut tokens = backend
            .tokens_for(&[ann, bob, Identity::from("cat@example.com")])
            .await
            .unwrap();
        tokens.sort();
        assert_eq!(
            tokens,
            vec![
                "ExponentPushToken[bob]".to_string(),
                "ExponentPushToken[new]".to_string(),
            ]
        );
    }

    #[backend_test(mongo)]
    async fn membership_and_catalog(backend: MongoBackend) {
        let group = backend.add_group(&[ANN, BOB]).await;
        let restaurant = backend.add_restaurant("Luigi's").await;

        assert_eq!(backend.member_count(group).await.unwrap(), 2);
        assert!(backend.is_member(group, &Identity::from(BOB)).await.unwrap());
        assert!(matches!(backend.members(Id::new()).await, Err(Error::NotFound(_))));
        assert!(backend.exists(restaurant).await.unwrap());
        assert!(!backend.exists(Id::new()).await.unwrap());
    }
}
