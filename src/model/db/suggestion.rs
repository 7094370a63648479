use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::{
    consensus::{quorum::should_close, resolution::Resolution},
    error::{Error, Result},
    model::{
        common::identity::{serde_identity_map, Identity},
        mongodb::Id,
    },
};

/// Core suggestion data, as stored in the database.
///
/// All state transitions live here and are pure: they neither persist nor
/// notify, they only report what changed.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct SuggestionCore {
    /// The group the restaurant was suggested to.
    pub group_id: Id,
    /// The suggested restaurant.
    pub restaurant_id: Id,
    /// Restaurant name as the catalog had it when suggested.
    pub restaurant_name: String,
    /// The member who made the suggestion; the only one allowed to remove it.
    pub recommender: Identity,
    /// Members who voted for the suggestion.
    pub voters: BTreeSet<Identity>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub recommended_at: DateTime<Utc>,
    /// Set once a quorum of members voted. Never unset.
    pub closed: bool,
    /// Dates each member can make it, collected after closing.
    #[serde(with = "serde_identity_map")]
    pub availabilities: BTreeMap<Identity, BTreeSet<NaiveDate>>,
    /// The visit date, once chosen. Never changed after being set.
    pub locked_date: Option<NaiveDate>,
    /// Bumped on every write, used to detect concurrent modification.
    pub revision: i64,
}

impl SuggestionCore {
    /// Create a new, open suggestion with no voters.
    pub fn new(
        group_id: Id,
        restaurant_id: Id,
        restaurant_name: String,
        recommender: Identity,
    ) -> Self {
        Self {
            group_id,
            restaurant_id,
            restaurant_name,
            recommender,
            voters: BTreeSet::new(),
            recommended_at: Utc::now(),
            closed: false,
            availabilities: BTreeMap::new(),
            locked_date: None,
            revision: 0,
        }
    }

    /// Record a vote. Voting twice is a no-op; returns whether the voter is new.
    pub fn add_voter(&mut self, voter: &Identity) -> bool {
        self.voters.insert(voter.clone())
    }

    /// Withdraw a vote. Returns whether there was a vote to withdraw.
    /// This never reopens a closed suggestion.
    pub fn remove_voter(&mut self, voter: &Identity) -> bool {
        self.voters.remove(voter)
    }

    /// Close the suggestion if its voters form a quorum of `member_count`
    /// members. Returns true only for the call that performs the transition.
    pub fn close_if_quorum(&mut self, member_count: usize) -> bool {
        if self.closed || !should_close(self.voters.len(), member_count) {
            return false;
        }
        self.closed = true;
        true
    }

    /// Store (replacing any previous submission) the dates `member` is
    /// available on. Only allowed once the suggestion is closed.
    pub fn set_availability(
        &mut self,
        member: &Identity,
        dates: impl IntoIterator<Item = NaiveDate>,
    ) -> Result<()> {
        if !self.closed {
            return Err(Error::conflict(
                "Suggestion has not been closed for scheduling yet",
            ));
        }
        self.availabilities
            .insert(member.clone(), dates.into_iter().collect());
        Ok(())
    }

    /// Has every current voter offered at least one date?
    pub fn availability_complete(&self) -> bool {
        !self.voters.is_empty()
            && self.voters.iter().all(|voter| {
                self.availabilities
                    .get(voter)
                    .map_or(false, |dates| !dates.is_empty())
            })
    }

    /// Pick the visit date if the suggestion is ready for it.
    ///
    /// Returns `None` without attempting anything if the suggestion is not
    /// closed, already locked, or still waiting on a voter's availability.
    /// Otherwise returns the resolution, having locked its date if it has one.
    pub fn try_lock(&mut self) -> Option<Resolution> {
        if !self.closed || self.locked_date.is_some() || !self.availability_complete() {
            return None;
        }
        let resolution = Resolution::resolve(
            self.voters
                .iter()
                .filter_map(|voter| self.availabilities.get(voter)),
        );
        self.locked_date = resolution.date();
        Some(resolution)
    }
}

/// A suggestion without an ID.
pub type NewSuggestion = SuggestionCore;

/// A suggestion from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub suggestion: SuggestionCore,
}

impl Deref for Suggestion {
    type Target = SuggestionCore;

    fn deref(&self) -> &Self::Target {
        &self.suggestion
    }
}

impl DerefMut for Suggestion {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.suggestion
    }
}
