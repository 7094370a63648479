use std::sync::Arc;

use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::consensus::ConsensusEngine;
use crate::model::mongodb::ensure_indexes_exist;
use crate::notify::{ExpoPushNotifier, SharedNotifier, EXPO_PUSH_URL};
use crate::store::{MongoBackend, PushTokens};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // secrets
    jwt_secret: String,
}

impl Config {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
        }
    }

    /// Secret key the account service signs identity tokens with.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "eatup".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// ensures the indexes exist, and places the [`MongoBackend`] and the push
/// token registry into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        let backend = MongoBackend::new(client, &db);
        let push_tokens: PushTokens = Arc::new(backend.clone());
        rocket = rocket.manage(backend).manage(push_tokens);
        Ok(rocket)
    }
}

/// Configuration for push notifications.
#[derive(Deserialize)]
struct NotifierConfig {
    #[serde(default = "default_push_url")]
    push_url: String,
}

fn default_push_url() -> String {
    EXPO_PUSH_URL.to_string()
}

/// A fairing that places the Expo push notifier into managed state.
/// Must be attached after [`DatabaseFairing`].
pub struct NotifierFairing;

#[rocket::async_trait]
impl Fairing for NotifierFairing {
    fn info(&self) -> Info {
        Info {
            name: "Expo push notifications",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<NotifierConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load notifier config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let tokens = match rocket.state::<PushTokens>() {
            Some(tokens) => tokens.clone(),
            None => {
                error!("Push token registry is not available");
                return Err(rocket);
            }
        };
        info!("Sending push notifications via {}", config.push_url);

        let notifier: SharedNotifier = Arc::new(ExpoPushNotifier::new(config.push_url, tokens));
        rocket = rocket.manage(notifier);
        Ok(rocket)
    }
}

/// A fairing that assembles the [`ConsensusEngine`] from the managed
/// backend and notifier. Must be attached after both of their fairings.
pub struct EngineFairing;

#[rocket::async_trait]
impl Fairing for EngineFairing {
    fn info(&self) -> Info {
        Info {
            name: "Consensus engine",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let backend = rocket.state::<MongoBackend>().cloned();
        let notifier = rocket.state::<SharedNotifier>().cloned();
        let (backend, notifier) = match (backend, notifier) {
            (Some(backend), Some(notifier)) => (backend, notifier),
            _ => {
                error!("Consensus engine dependencies are not available");
                return Err(rocket);
            }
        };

        rocket = rocket.manage(ConsensusEngine::with_backend(backend, notifier));
        Ok(rocket)
    }
}
