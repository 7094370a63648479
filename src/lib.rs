#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing, EngineFairing, NotifierFairing};
use crate::logging::LoggerFairing;

mod api;
pub mod config;
pub mod consensus;
pub mod error;
mod logging;
pub mod model;
pub mod notify;
pub mod store;

/// Build the production server: MongoDB storage and Expo notifications.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(NotifierFairing)
        .attach(EngineFairing)
        .attach(LoggerFairing)
}

/// Secret the test server verifies identity tokens with.
#[cfg(test)]
pub(crate) const TEST_JWT_SECRET: &str = "test-jwt-secret";

/// Build a server over the given backend and notifier.
#[cfg(test)]
pub(crate) fn rocket_for_backend<B>(backend: B, notifier: notify::RecordingNotifier) -> Rocket<Build>
where
    B: store::Membership
        + store::Catalog
        + store::SuggestionStore
        + store::PushTokenStore
        + Clone
        + 'static,
{
    use std::sync::Arc;

    use crate::consensus::ConsensusEngine;
    use crate::store::PushTokens;

    let figment = rocket::Config::figment().merge(("jwt_secret", TEST_JWT_SECRET));
    let push_tokens: PushTokens = Arc::new(backend.clone());
    let engine = ConsensusEngine::with_backend(backend, Arc::new(notifier));

    rocket::custom(figment)
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(LoggerFairing)
        .manage(push_tokens)
        .manage(engine)
}

/// Connect to a fresh test database with its indexes in place.
///
/// Database-backed tests only run when `ROCKET_DB_URI` names a MongoDB
/// replica set; otherwise this returns `None`. Each call gets its own
/// database so tests can run in parallel.
#[cfg(test)]
pub(crate) async fn test_database() -> Option<(mongodb::Client, mongodb::Database)> {
    let db_uri = std::env::var("ROCKET_DB_URI").ok()?;
    let client = mongodb::Client::with_uri_str(&db_uri).await.unwrap();
    let db = client.database(&format!("test_{}", model::mongodb::Id::new()));
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();
    Some((client, db))
}
