use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rocket::http::Status;

use crate::error::{Error, Result};
use crate::model::{
    common::identity::Identity,
    db::suggestion::{NewSuggestion, Suggestion},
    mongodb::Id,
};
use crate::notify::SharedNotifier;
use crate::store::{Catalog, Membership, SuggestionStore};

use super::resolution::Resolution;

/// How many times a contended suggestion write is retried before giving up.
pub const MAX_WRITE_ATTEMPTS: usize = 16;

/// Orchestrates suggestions, votes and scheduling for groups.
///
/// Every mutation of a suggestion is a read, a pure transition and a
/// conditional write. A transition (closing, locking) is only acted upon by
/// the caller whose write succeeded, so each one is reported exactly once.
pub struct ConsensusEngine {
    membership: Arc<dyn Membership>,
    catalog: Arc<dyn Catalog>,
    suggestions: Arc<dyn SuggestionStore>,
    notifier: SharedNotifier,
}

impl ConsensusEngine {
    pub fn new(
        membership: Arc<dyn Membership>,
        catalog: Arc<dyn Catalog>,
        suggestions: Arc<dyn SuggestionStore>,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            membership,
            catalog,
            suggestions,
            notifier,
        }
    }

    /// Use one backend for membership, the catalog and suggestions.
    pub fn with_backend<B>(backend: B, notifier: SharedNotifier) -> Self
    where
        B: Membership + Catalog + SuggestionStore + 'static,
    {
        let backend = Arc::new(backend);
        Self::new(backend.clone(), backend.clone(), backend, notifier)
    }

    /// Suggest a restaurant to a group.
    pub async fn suggest(
        &self,
        group_id: Id,
        restaurant_id: Id,
        proposer: &Identity,
    ) -> Result<Suggestion> {
        let restaurant = self
            .catalog
            .get(restaurant_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Restaurant with ID '{restaurant_id}'")))?;
        self.ensure_member(group_id, proposer).await?;

        if self
            .suggestions
            .find_for_restaurant(group_id, restaurant_id)
            .await?
            .is_some()
        {
            return Err(Error::conflict(
                "Restaurant has already been suggested to this group",
            ));
        }

        let suggestion = self
            .suggestions
            .insert(NewSuggestion::new(
                group_id,
                restaurant_id,
                restaurant.name,
                proposer.clone(),
            ))
            .await?;
        info!(
            "{proposer} suggested {} to group {group_id} as {}",
            suggestion.restaurant_name, suggestion.id
        );
        Ok(suggestion)
    }

    /// Vote for a suggestion, closing it if this gives it a majority.
    pub async fn vote(&self, group_id: Id, suggestion_id: Id, voter: &Identity) -> Result<Suggestion> {
        self.ensure_member(group_id, voter).await?;
        let member_count = self.membership.member_count(group_id).await?;

        let (suggestion, closed_now) = self
            .update(group_id, suggestion_id, |suggestion| {
                let added = suggestion.add_voter(voter);
                let closed = suggestion.close_if_quorum(member_count);
                Ok((added || closed, closed))
            })
            .await?;

        if closed_now {
            let voter_count = suggestion.voters.len();
            info!("Suggestion {suggestion_id} closed with {voter_count}/{member_count} votes");
            if let Some(members) = self.members_to_notify(group_id).await {
                self.notifier.notify_threshold_reached(
                    members,
                    group_id,
                    suggestion_id,
                    &suggestion.restaurant_name,
                    voter_count,
                    member_count,
                );
            }
        }
        Ok(suggestion)
    }

    /// Withdraw a vote. A closed suggestion stays closed.
    pub async fn unvote(&self, group_id: Id, suggestion_id: Id, voter: &Identity) -> Result<Suggestion> {
        self.ensure_member(group_id, voter).await?;
        let (suggestion, ()) = self
            .update(group_id, suggestion_id, |suggestion| {
                Ok((suggestion.remove_voter(voter), ()))
            })
            .await?;
        Ok(suggestion)
    }

    /// Record the dates a member can make it, locking the visit date once
    /// every voter has answered.
    pub async fn set_availability(
        &self,
        group_id: Id,
        suggestion_id: Id,
        member: &Identity,
        dates: &[String],
    ) -> Result<Suggestion> {
        self.ensure_member(group_id, member).await?;
        let parsed = parse_dates(dates);

        let (suggestion, resolution) = self
            .update(group_id, suggestion_id, |suggestion| {
                let dates = parsed
                    .as_ref()
                    .map_err(|bad| Error::conflict(format!("Invalid date format: {bad}")))?;
                suggestion.set_availability(member, dates.iter().copied())?;
                Ok((true, suggestion.try_lock()))
            })
            .await?;

        match resolution {
            Some(Resolution::Common(date)) | Some(Resolution::MostPopular(date)) => {
                info!("Suggestion {suggestion_id} locked for {date}");
                self.notifier.notify_date_locked(
                    vec![suggestion.recommender.clone()],
                    group_id,
                    suggestion_id,
                    &suggestion.restaurant_name,
                    date,
                );
                if let Some(members) = self.members_to_notify(group_id).await {
                    self.notifier.notify_date_locked(
                        members,
                        group_id,
                        suggestion_id,
                        &suggestion.restaurant_name,
                        date,
                    );
                }
            }
            Some(Resolution::NoDates) => {
                info!("Suggestion {suggestion_id} has no candidate dates");
                if let Some(members) = self.members_to_notify(group_id).await {
                    self.notifier.notify_no_common_date(
                        members,
                        group_id,
                        suggestion_id,
                        &suggestion.restaurant_name,
                    );
                }
            }
            None => {}
        }
        Ok(suggestion)
    }

    /// Delete a suggestion. Only its recommender may do this.
    pub async fn remove_suggestion(
        &self,
        group_id: Id,
        suggestion_id: Id,
        requester: &Identity,
    ) -> Result<()> {
        let suggestion = self.suggestion_in_group(group_id, suggestion_id).await?;
        if suggestion.recommender != *requester {
            return Err(Error::forbidden(
                "Only the recommender can remove a suggestion",
            ));
        }
        if !self.suggestions.remove(group_id, suggestion_id).await? {
            return Err(suggestion_not_found(suggestion_id));
        }
        info!("{requester} removed suggestion {suggestion_id} from group {group_id}");
        Ok(())
    }

    /// All of a group's suggestions, oldest first.
    pub async fn list_suggestions(&self, group_id: Id, requester: &Identity) -> Result<Vec<Suggestion>> {
        self.ensure_member(group_id, requester).await?;
        self.suggestions.list(group_id).await
    }

    /// Apply `transition` to a suggestion and persist the result, retrying
    /// from a fresh read whenever a concurrent write gets there first.
    ///
    /// The transition returns whether it changed anything, plus an outcome
    /// that is handed back once the write has succeeded.
    async fn update<T, F>(&self, group_id: Id, suggestion_id: Id, mut transition: F) -> Result<(Suggestion, T)>
    where
        F: FnMut(&mut Suggestion) -> Result<(bool, T)> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut suggestion = self.suggestion_in_group(group_id, suggestion_id).await?;
            let (changed, outcome) = transition(&mut suggestion)?;
            if !changed {
                return Ok((suggestion, outcome));
            }

            let expected = suggestion.revision;
            suggestion.revision += 1;
            if self.suggestions.replace(&suggestion, expected).await? {
                return Ok((suggestion, outcome));
            }
            debug!("Suggestion {suggestion_id} was modified concurrently (attempt {attempt})");
        }

        warn!("Gave up writing suggestion {suggestion_id} after {MAX_WRITE_ATTEMPTS} attempts");
        Err(Error::Status(
            Status::ServiceUnavailable,
            format!("Suggestion {suggestion_id} is busy, try again"),
        ))
    }

    async fn suggestion_in_group(&self, group_id: Id, suggestion_id: Id) -> Result<Suggestion> {
        self.suggestions
            .get(suggestion_id)
            .await?
            .filter(|suggestion| suggestion.group_id == group_id)
            .ok_or_else(|| suggestion_not_found(suggestion_id))
    }

    async fn ensure_member(&self, group_id: Id, identity: &Identity) -> Result<()> {
        if self.membership.is_member(group_id, identity).await? {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "{identity} is not a member of group {group_id}"
            )))
        }
    }

    /// The group's current members, or `None` if they can't be loaded.
    /// Notifying is best-effort, so failures here are only logged.
    async fn members_to_notify(&self, group_id: Id) -> Option<Vec<Identity>> {
        match self.membership.members(group_id).await {
            Ok(members) => Some(members),
            Err(e) => {
                warn!("Not notifying group {group_id}, could not load members: {e}");
                None
            }
        }
    }
}

fn suggestion_not_found(suggestion_id: Id) -> Error {
    Error::not_found(format!("Suggestion with ID '{suggestion_id}'"))
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse strict `yyyy-mm-dd` dates, dropping duplicates. On failure, returns
/// the first string that is not a valid calendar date in exactly that form.
fn parse_dates(raw: &[String]) -> std::result::Result<BTreeSet<NaiveDate>, String> {
    raw.iter()
        .map(|date| {
            // chrono tolerates unpadded fields, signs and leading spaces.
            NaiveDate::parse_from_str(date, DATE_FORMAT)
                .ok()
                .filter(|parsed| {
                    date.len() == 10 && parsed.format(DATE_FORMAT).to_string() == *date
                })
                .ok_or_else(|| date.clone())
        })
        .collect()
}
