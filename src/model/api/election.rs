use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{
    common::{ElectionState, VotingMode, WalletAddress},
    db::{Election, NewElection},
};

/// Specification for creating or replacing an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub title: String,
    pub description: String,
    pub voting_mode: VotingMode,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ElectionSpec {
    /// Convert into a DB-ready draft election, validating the scheduled window.
    pub fn into_election(self, created_by: WalletAddress) -> Result<NewElection, Error> {
        if self.start_time >= self.end_time {
            return Err(Error::BadRequest(
                "Election start time must precede its end time".to_string(),
            ));
        }
        if self.title.trim().is_empty() {
            return Err(Error::BadRequest(
                "Election title must not be empty".to_string(),
            ));
        }
        Ok(NewElection::new(
            self.title,
            self.description,
            self.voting_mode,
            self.start_time,
            self.end_time,
            created_by,
        ))
    }
}

/// Full election description returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: String,
    pub title: String,
    pub description: String,
    pub state: ElectionState,
    pub voting_mode: VotingMode,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub vote_count: u64,
    pub candidates: Vec<String>,
    pub created_by: WalletAddress,
    pub updated_by: WalletAddress,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.to_string(),
            title: election.election.title,
            description: election.election.description,
            state: election.election.state,
            voting_mode: election.election.voting_mode,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            actual_start: election.election.actual_start,
            actual_end: election.election.actual_end,
            vote_count: election.election.vote_count,
            candidates: election
                .election
                .candidates
                .iter()
                .map(ToString::to_string)
                .collect(),
            created_by: election.election.created_by,
            updated_by: election.election.updated_by,
        }
    }
}

/// Top-level election metadata for list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: String,
    pub title: String,
    pub state: ElectionState,
    pub voting_mode: VotingMode,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub vote_count: u64,
}

impl From<Election> for ElectionSummary {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.to_string(),
            title: election.election.title,
            state: election.election.state,
            voting_mode: election.election.voting_mode,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            vote_count: election.election.vote_count,
        }
    }
}

/// Per-candidate tallies for an election, kept locally for fast reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election: ElectionSummary,
    pub total_votes: u64,
    pub candidates: Vec<super::candidate::CandidateView>,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use chrono::Duration;

    impl ElectionSpec {
        /// An election whose scheduled window contains the present.
        pub fn current_example() -> Self {
            let now = Utc::now();
            Self {
                title: "Student Union Committee 2026".to_string(),
                description: "Annual committee election".to_string(),
                voting_mode: VotingMode::SimpleMajority,
                start_time: now - Duration::hours(1),
                end_time: now + Duration::hours(24),
            }
        }

        /// An election scheduled entirely in the future.
        pub fn future_example() -> Self {
            let now = Utc::now();
            Self {
                title: "Next Year's Committee".to_string(),
                description: "Planning ahead".to_string(),
                voting_mode: VotingMode::SimpleMajority,
                start_time: now + Duration::days(30),
                end_time: now + Duration::days(31),
            }
        }
    }
}
