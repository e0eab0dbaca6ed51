use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{CandidateStatus, WalletAddress},
    mongodb::{bson_datetime_option, Id},
};

/// Core candidate data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    /// Owning election.
    pub election_id: Id,
    /// Candidate name; unique within the election.
    pub name: String,
    /// Party affiliation, if any.
    pub party: Option<String>,
    /// Free-text platform description.
    pub description: String,
    /// Review state.
    pub status: CandidateStatus,
    /// Direct-vote tally. Only ever increases, and only while the owning
    /// election accepts votes.
    pub vote_count: u64,
    /// Tally of votes received via delegation.
    pub delegated_vote_count: u64,
    /// Administrator who approved or rejected the candidate.
    pub reviewed_by: Option<WalletAddress>,
    /// Instant of the approval or rejection.
    #[serde(with = "bson_datetime_option")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl CandidateCore {
    /// Register a new candidate, pending review.
    pub fn new(election_id: Id, name: String, party: Option<String>, description: String) -> Self {
        Self {
            election_id,
            name,
            party,
            description,
            status: CandidateStatus::Pending,
            vote_count: 0,
            delegated_vote_count: 0,
            reviewed_by: None,
            reviewed_at: None,
        }
    }
}

/// A new candidate ready for DB insertion is just a candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}
