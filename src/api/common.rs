use mongodb::bson::doc;

use crate::error::{Error, Result};
use crate::model::{
    common::WalletAddress,
    db::{Candidate, Election, Settings, Voter},
    mongodb::{Coll, Id},
};

/// Look up a voter by wallet address.
pub async fn voter_by_address(address: &WalletAddress, voters: &Coll<Voter>) -> Result<Voter> {
    voters
        .find_one(doc! { "address": address }, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {address}")))
}

/// Look up an election by ID.
pub async fn election_by_id(election_id: Id, elections: &Coll<Election>) -> Result<Election> {
    elections
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
}

/// Look up a candidate by ID.
pub async fn candidate_by_id(candidate_id: Id, candidates: &Coll<Candidate>) -> Result<Candidate> {
    candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or(Error::CandidateNotFound)
}

/// Get the settings singleton, bootstrapped at ignition.
pub async fn current_settings(settings: &Coll<Settings>) -> Result<Settings> {
    settings
        .find_one(None, None)
        .await?
        .ok_or_else(|| Error::not_found("Settings"))
}
