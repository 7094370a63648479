use serde::{Deserialize, Serialize};

use crate::model::{common::identity::Identity, mongodb::Id};

/// A group, as maintained by the membership service.
///
/// Only the fields this service reads or writes are modelled; the rest of
/// the document is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Identities of the current members.
    #[serde(default)]
    pub members: Vec<Identity>,
    /// IDs of the group's active suggestions, oldest first.
    #[serde(default)]
    pub suggestions: Vec<Id>,
}
