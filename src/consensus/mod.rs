//! Suggestion voting and visit-date scheduling.

mod engine;
pub mod quorum;
pub mod resolution;

pub use engine::{ConsensusEngine, MAX_WRITE_ATTEMPTS};
pub use resolution::Resolution;
