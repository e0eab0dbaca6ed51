use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, to_bson},
    ClientSession,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    common::{VoteType, WalletAddress},
    mongodb::{Coll, Id},
};

/// One accepted vote, embedded in the voter's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// The election voted in. At most one record per election per voter.
    pub election_id: Id,
    /// The candidate voted for.
    pub candidate_id: Id,
    /// How the vote reached the ledger.
    pub vote_type: VoteType,
    /// Ledger transaction reference returned on confirmation.
    pub ledger_txn: String,
    /// Content hash of the vote.
    pub vote_hash: String,
    /// Instant the vote was committed locally.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

/// Core voter data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// Voter identity: their wallet address. Unique-indexed.
    pub address: WalletAddress,
    /// Whether the voter's identity has been verified.
    pub verified: bool,
    /// Accepted votes, one per election.
    pub voting_history: Vec<VoteRecord>,
}

impl VoterCore {
    /// Create a new voter with an empty voting history.
    pub fn new(address: WalletAddress) -> Self {
        Self {
            address,
            verified: true,
            voting_history: Vec::new(),
        }
    }

    /// Has this voter already voted in the given election?
    ///
    /// A pure lookup; callers on the cast path must treat the answer as
    /// advisory and rely on [`Voter::record_vote`] for the authoritative
    /// decision.
    pub fn has_voted(&self, election_id: &Id) -> bool {
        self.voting_history
            .iter()
            .any(|record| record.election_id == *election_id)
    }
}

/// A new voter ready for DB insertion is just a voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Voter {
    /// Append a vote record, guarded by the storage layer: the filter only
    /// matches while no history entry exists for this election, so under
    /// concurrent invocation for the same `(voter, election)` pair exactly
    /// one call can succeed.
    ///
    /// Returns `false` if the precondition failed, i.e. a record for this
    /// election was already present.
    pub async fn record_vote(
        voters: &Coll<Voter>,
        voter_id: Id,
        record: &VoteRecord,
        session: &mut ClientSession,
    ) -> Result<bool> {
        let filter = doc! {
            "_id": voter_id,
            "voting_history.election_id": { "$ne": record.election_id },
        };
        let update = doc! {
            "$push": {
                "voting_history": to_bson(record).expect("Serialisation is infallible"),
            }
        };
        let result = voters
            .update_one_with_session(filter, update, None, session)
            .await?;
        Ok(result.modified_count == 1)
    }
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_voted_matches_only_recorded_elections() {
        let election = Id::new();
        let other = Id::new();
        let mut voter = VoterCore::new(
            "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
                .parse()
                .unwrap(),
        );
        assert!(!voter.has_voted(&election));

        voter.voting_history.push(VoteRecord {
            election_id: election,
            candidate_id: Id::new(),
            vote_type: VoteType::Direct,
            ledger_txn: "0xabc".to_string(),
            vote_hash: "00".to_string(),
            cast_at: Utc::now(),
        });
        assert!(voter.has_voted(&election));
        assert!(!voter.has_voted(&other));
    }
}
