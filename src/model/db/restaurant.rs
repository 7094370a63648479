use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// A restaurant from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
}
