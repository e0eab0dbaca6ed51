use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    api::candidate::CandidateView, api::signed::SignedMessage, common::VoteType, db::Voter,
    mongodb::Id,
};

/// A vote the voter wishes to cast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVoteRequest {
    /// The candidate voted for.
    pub candidate_id: Id,
    /// How the vote should reach the ledger.
    #[serde(default)]
    pub vote_type: VoteType,
    /// The voter's signature authorising this vote.
    pub signed: SignedMessage,
}

/// Receipt returned after a successful cast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    /// Ledger transaction reference for the committed vote.
    pub ledger_txn: String,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Snapshot of the candidate after the tally update.
    pub candidate: CandidateView,
}

/// Per-wallet voting status summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterStatus {
    pub registered: bool,
    pub verified: bool,
    /// Elections the wallet has voted in, keyed by election ID.
    pub has_voted: HashMap<String, bool>,
}

impl VoterStatus {
    /// The status of a wallet that has never registered.
    pub fn unregistered() -> Self {
        Self {
            registered: false,
            verified: false,
            has_voted: HashMap::new(),
        }
    }
}

impl From<&Voter> for VoterStatus {
    fn from(voter: &Voter) -> Self {
        Self {
            registered: true,
            verified: voter.verified,
            has_voted: voter
                .voting_history
                .iter()
                .map(|record| (record.election_id.to_string(), true))
                .collect(),
        }
    }
}
