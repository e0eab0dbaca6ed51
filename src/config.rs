use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::ledger::{HttpLedger, VoteLedger};
use crate::model::{
    common::WalletAddress,
    db::ensure_settings_exist,
    mongodb::{ensure_indexes_exist, Coll},
};
use crate::rate_limit::RateLimiter;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    admin_addresses: Vec<String>,
    ledger_url: String,
    ledger_timeout_ms: u64,
    rate_limit_window_secs: u64,
    rate_limit_max_requests: usize,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Valid lifetime of auth token cookies.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Is the given address on the administrator allow-list?
    ///
    /// This is the only way to hold admin rights; there is deliberately no
    /// other path that grants them.
    pub fn is_admin(&self, address: &WalletAddress) -> bool {
        self.admin_addresses
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(address.as_str()))
    }

    /// Base URL of the ledger contract gateway.
    pub fn ledger_url(&self) -> &str {
        &self.ledger_url
    }

    /// Upper bound on one ledger submission, confirmation included.
    pub fn ledger_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.ledger_timeout_ms)
    }

    /// Width of the rate limiting window.
    pub fn rate_limit_window(&self) -> StdDuration {
        StdDuration::from_secs(self.rate_limit_window_secs)
    }

    /// Requests allowed per address per window.
    pub fn rate_limit_max_requests(&self) -> usize {
        self.rate_limit_max_requests
    }
}

/// A fairing that loads the application config and puts it in managed
/// state, along with the rate limiter built from it.
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
        if config.admin_addresses.is_empty() {
            error!("Refusing to launch without any administrator addresses");
            return Err(rocket);
        }

        let limiter = RateLimiter::new(
            config.rate_limit_window(),
            config.rate_limit_max_requests(),
        );

        // Manage the state.
        rocket = rocket.manage(config).manage(limiter);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a
/// `Database` into managed state.
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
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist; the double-vote and duplicate
        // registration guards depend on them.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to set up database indexes: {e}");
            return Err(rocket);
        }

        // Ensure the settings singleton exists.
        if let Err(e) = ensure_settings_exist(&Coll::from_db(&db)).await {
            error!("Failed to set up settings: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "chainvote".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Configuration for the ledger client.
#[derive(Deserialize)]
struct LedgerConfig {
    // non-secrets
    ledger_url: String,
    ledger_timeout_ms: u64,
}

/// A fairing that builds the ledger client and places it into managed state.
pub struct LedgerFairing;

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger client",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<LedgerConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load ledger config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let ledger: Arc<dyn VoteLedger> = Arc::new(HttpLedger::new(
            config.ledger_url,
            StdDuration::from_millis(config.ledger_timeout_ms),
        ));
        info!("Ledger client configured");

        // Manage the state.
        rocket = rocket.manage(ledger);
        Ok(rocket)
    }
}
