use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{common::identity::Identity, db::suggestion::Suggestion, mongodb::Id};

/// An API-friendly view of a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionDescription {
    pub id: String,
    pub group_id: String,
    pub restaurant_id: String,
    pub restaurant_name: String,
    pub recommender: Identity,
    /// Voters, in identity order.
    pub voters: Vec<Identity>,
    pub recommended_at: DateTime<Utc>,
    /// Whether a majority has voted and availability is being collected.
    pub closed: bool,
    pub locked_date: Option<NaiveDate>,
    /// Dates each member offered, keyed by their identity.
    pub availabilities: BTreeMap<Identity, BTreeSet<NaiveDate>>,
}

impl From<Suggestion> for SuggestionDescription {
    fn from(suggestion: Suggestion) -> Self {
        let id = suggestion.id.to_string();
        let core = suggestion.suggestion;
        Self {
            id,
            group_id: core.group_id.to_string(),
            restaurant_id: core.restaurant_id.to_string(),
            restaurant_name: core.restaurant_name,
            recommender: core.recommender,
            voters: core.voters.into_iter().collect(),
            recommended_at: core.recommended_at,
            closed: core.closed,
            locked_date: core.locked_date,
            availabilities: core.availabilities,
        }
    }
}

/// Body of a request to suggest a restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestRequest {
    pub restaurant_id: String,
}

/// Reply to a successful change to a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
    pub suggestion_id: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, suggestion_id: Id) -> Self {
        Self {
            message: message.into(),
            suggestion_id: suggestion_id.to_string(),
        }
    }
}

/// Body of a push token registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTokenRequest {
    pub token: String,
}
