use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    audit::AuditLogEntry,
    candidate::{Candidate, NewCandidate},
    election::{Election, NewElection},
    settings::Settings,
    voter::{NewVoter, Voter},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// Voter collections
const VOTERS: &str = "voters";
impl MongoCollection for Voter {
    const NAME: &'static str = VOTERS;
}
impl MongoCollection for NewVoter {
    const NAME: &'static str = VOTERS;
}

// Election collections
const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}
impl MongoCollection for NewElection {
    const NAME: &'static str = ELECTIONS;
}

// Candidate collections
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for NewCandidate {
    const NAME: &'static str = CANDIDATES;
}

// Audit log collection
const AUDIT_LOG: &str = "audit_log";
impl MongoCollection for AuditLogEntry {
    const NAME: &'static str = AUDIT_LOG;
}

// Settings collection
const SETTINGS: &str = "settings";
impl MongoCollection for Settings {
    const NAME: &'static str = SETTINGS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// The unique indexes here are load-bearing: voter registration and the
/// candidate namespace rely on them rather than on read-then-write checks.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Voter collection: one document per wallet address.
    let voter_index = IndexModel::builder()
        .keys(doc! {"address": 1})
        .options(unique.clone())
        .build();
    Coll::<Voter>::from_db(db)
        .create_index(voter_index, None)
        .await?;

    // Candidate collection: names are unique within an election.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "name": 1})
        .options(unique)
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Audit log collection: range queries by kind, actor, and time window.
    let audit_kind_index = IndexModel::builder()
        .keys(doc! {"action": 1, "timestamp": -1})
        .build();
    let audit_actor_index = IndexModel::builder()
        .keys(doc! {"actor": 1, "timestamp": -1})
        .build();
    let audit = Coll::<AuditLogEntry>::from_db(db);
    audit.create_index(audit_kind_index, None).await?;
    audit.create_index(audit_actor_index, None).await?;

    Ok(())
}
