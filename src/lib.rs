#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod rate_limit;

pub use config::Config;

use config::{ConfigFairing, DatabaseFairing, LedgerFairing};
use logging::LoggerFairing;

/// Build the rocket instance (yet to be ignited).
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(LedgerFairing)
        .attach(LoggerFairing)
}

/// Connect to the test database server.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri =
        std::env::var("DB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("Could not connect to the test database")
}

/// Get a random test database name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn database() -> String {
    let random: u32 = rand::random();
    format!("test{random}")
}

/// The fixed voter keypair used by test sign-ins.
#[cfg(test)]
pub(crate) fn test_voter_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[11u8; 32])
}

/// The fixed admin keypair; its address is on the test allow-list.
#[cfg(test)]
pub(crate) fn test_admin_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[22u8; 32])
}

/// Build a rocket instance against the given database and a scriptable mock
/// ledger, with a test configuration baked in.
#[cfg(test)]
pub(crate) async fn rocket_for_db_and_ledger(
    db_client: mongodb::Client,
    db_name: &str,
    mock: std::sync::Arc<ledger::MockLedger>,
) -> Rocket<Build> {
    use std::sync::Arc;

    use ledger::VoteLedger;
    use model::{
        common::WalletAddress,
        db::ensure_settings_exist,
        mongodb::{ensure_indexes_exist, Coll},
    };
    use rate_limit::RateLimiter;

    let db = db_client.database(db_name);
    ensure_indexes_exist(&db).await.unwrap();
    ensure_settings_exist(&Coll::from_db(&db)).await.unwrap();

    let admin_address = WalletAddress::from_public_key(&test_admin_key().verifying_key());
    let figment = rocket::Config::figment()
        .merge(("jwt_secret", "test-jwt-secret-not-for-production"))
        .merge(("auth_ttl", 3600u32))
        .merge(("ledger_url", "http://localhost:9"))
        .merge(("ledger_timeout_ms", 1000u64))
        .merge(("rate_limit_window_secs", 60u64))
        .merge(("rate_limit_max_requests", 100_000u64))
        .merge(("admin_addresses", vec![admin_address.as_str().to_string()]));
    let config: Config = figment.extract().expect("test config is complete");
    let limiter = RateLimiter::new(config.rate_limit_window(), config.rate_limit_max_requests());
    let ledger: Arc<dyn VoteLedger> = mock.clone();

    rocket::custom(figment)
        .mount("/", api::routes())
        .manage(config)
        .manage(limiter)
        .manage(db_client)
        .manage(db)
        .manage(ledger)
        .manage(mock)
}
