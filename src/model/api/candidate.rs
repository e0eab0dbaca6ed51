use serde::{Deserialize, Serialize};

use crate::model::{common::CandidateStatus, db::Candidate};

/// Specification for registering or updating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    pub party: Option<String>,
    pub description: String,
}

/// A client-facing snapshot of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateView {
    pub id: String,
    pub election_id: String,
    pub name: String,
    pub party: Option<String>,
    pub description: String,
    pub status: CandidateStatus,
    pub vote_count: u64,
    pub delegated_vote_count: u64,
}

impl From<Candidate> for CandidateView {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.to_string(),
            election_id: candidate.candidate.election_id.to_string(),
            name: candidate.candidate.name,
            party: candidate.candidate.party,
            description: candidate.candidate.description,
            status: candidate.candidate.status,
            vote_count: candidate.candidate.vote_count,
            delegated_vote_count: candidate.candidate.delegated_vote_count,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl CandidateSpec {
        pub fn example1() -> Self {
            Self {
                name: "Alice Chen".to_string(),
                party: Some("Progress Party".to_string()),
                description: "Longer library hours".to_string(),
            }
        }

        pub fn example2() -> Self {
            Self {
                name: "Bob Osei".to_string(),
                party: None,
                description: "Cheaper coffee".to_string(),
            }
        }
    }
}
