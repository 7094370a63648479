//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//! - Maps keyed by member identity use reversible storage keys.

pub mod group;
pub mod push_token;
pub mod restaurant;
pub mod suggestion;
