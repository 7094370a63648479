//! Fire-and-forget notifications about consensus progress.

use std::sync::Arc;

use chrono::NaiveDate;
use rocket::serde::json::{json, Value};

use crate::model::{common::identity::Identity, mongodb::Id};

mod expo;
#[cfg(test)]
mod recording;

pub use expo::{ExpoPushNotifier, EXPO_PUSH_URL};
#[cfg(test)]
pub use recording::RecordingNotifier;

/// Something members should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A suggestion just gained a majority of the group and closed.
    ThresholdReached {
        recipients: Vec<Identity>,
        group_id: Id,
        suggestion_id: Id,
        restaurant_name: String,
        voter_count: usize,
        member_count: usize,
    },
    /// A visit date was fixed.
    DateLocked {
        recipients: Vec<Identity>,
        group_id: Id,
        suggestion_id: Id,
        restaurant_name: String,
        date: NaiveDate,
    },
    /// Every voter answered but nobody offered a date.
    NoCommonDate {
        recipients: Vec<Identity>,
        group_id: Id,
        suggestion_id: Id,
        restaurant_name: String,
    },
}

impl Notification {
    pub fn recipients(&self) -> &[Identity] {
        match self {
            Self::ThresholdReached { recipients, .. }
            | Self::DateLocked { recipients, .. }
            | Self::NoCommonDate { recipients, .. } => recipients,
        }
    }

    /// Machine-readable event type, sent along in the payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ThresholdReached { .. } => "voting_threshold_reached",
            Self::DateLocked { .. } => "date_locked",
            Self::NoCommonDate { .. } => "no_common_date",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::ThresholdReached { .. } => "🎉 Consensus Reached!",
            Self::DateLocked { .. } => "📅 Date Locked!",
            Self::NoCommonDate { .. } => "No Common Date",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::ThresholdReached {
                restaurant_name,
                voter_count,
                member_count,
                ..
            } => format!(
                "More than half the group ({voter_count}/{member_count}) wants to go to {restaurant_name}!"
            ),
            Self::DateLocked {
                restaurant_name,
                date,
                ..
            } => format!("You're going to {restaurant_name} on {date}!"),
            Self::NoCommonDate {
                restaurant_name, ..
            } => format!("Nobody offered a date for {restaurant_name}."),
        }
    }

    /// Structured payload for the client app.
    pub fn data(&self) -> Value {
        match self {
            Self::ThresholdReached {
                group_id,
                suggestion_id,
                restaurant_name,
                voter_count,
                member_count,
                ..
            } => json!({
                "type": self.kind(),
                "groupId": group_id.to_string(),
                "suggestionId": suggestion_id.to_string(),
                "restaurantName": restaurant_name,
                "voterCount": voter_count,
                "totalMembers": member_count,
            }),
            Self::DateLocked {
                group_id,
                suggestion_id,
                restaurant_name,
                date,
                ..
            } => json!({
                "type": self.kind(),
                "groupId": group_id.to_string(),
                "suggestionId": suggestion_id.to_string(),
                "restaurantName": restaurant_name,
                "date": date.to_string(),
            }),
            Self::NoCommonDate {
                group_id,
                suggestion_id,
                restaurant_name,
                ..
            } => json!({
                "type": self.kind(),
                "groupId": group_id.to_string(),
                "suggestionId": suggestion_id.to_string(),
                "restaurantName": restaurant_name,
            }),
        }
    }
}

/// Delivers notifications without blocking the caller.
///
/// Implementations must return promptly and must absorb delivery failures.
pub trait Notifier: Send + Sync {
    fn dispatch(&self, notification: Notification);

    fn notify_threshold_reached(
        &self,
        recipients: Vec<Identity>,
        group_id: Id,
        suggestion_id: Id,
        restaurant_name: &str,
        voter_count: usize,
        member_count: usize,
    ) {
        self.dispatch(Notification::ThresholdReached {
            recipients,
            group_id,
            suggestion_id,
            restaurant_name: restaurant_name.to_string(),
            voter_count,
            member_count,
        });
    }

    fn notify_date_locked(
        &self,
        recipients: Vec<Identity>,
        group_id: Id,
        suggestion_id: Id,
        restaurant_name: &str,
        date: NaiveDate,
    ) {
        self.dispatch(Notification::DateLocked {
            recipients,
            group_id,
            suggestion_id,
            restaurant_name: restaurant_name.to_string(),
            date,
        });
    }

    fn notify_no_common_date(
        &self,
        recipients: Vec<Identity>,
        group_id: Id,
        suggestion_id: Id,
        restaurant_name: &str,
    ) {
        self.dispatch(Notification::NoCommonDate {
            recipients,
            group_id,
            suggestion_id,
            restaurant_name: restaurant_name.to_string(),
        });
    }
}

pub type SharedNotifier = Arc<dyn Notifier>;
