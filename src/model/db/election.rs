use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ElectionState, VotingMode, WalletAddress},
    mongodb::{bson_datetime_option, Id},
};

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// Longer free-text description.
    pub description: String,
    /// Lifecycle state.
    pub state: ElectionState,
    /// Vote aggregation mode.
    pub voting_mode: VotingMode,
    /// Scheduled window start.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Scheduled window end.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Instant the election was actually started, once it has been.
    #[serde(with = "bson_datetime_option")]
    pub actual_start: Option<DateTime<Utc>>,
    /// Instant the election was actually stopped, once it has been.
    #[serde(with = "bson_datetime_option")]
    pub actual_end: Option<DateTime<Utc>>,
    /// Aggregate accepted-vote tally; always the sum of the candidates' tallies.
    pub vote_count: u64,
    /// Candidates standing in this election, in registration order.
    pub candidates: Vec<Id>,
    /// Administrator who created the election.
    pub created_by: WalletAddress,
    /// Administrator who last mutated the election.
    pub updated_by: WalletAddress,
}

impl ElectionCore {
    /// Create a new election in `Draft`.
    pub fn new(
        title: String,
        description: String,
        voting_mode: VotingMode,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        created_by: WalletAddress,
    ) -> Self {
        Self {
            title,
            description,
            state: ElectionState::Draft,
            voting_mode,
            start_time,
            end_time,
            actual_start: None,
            actual_end: None,
            vote_count: 0,
            candidates: Vec::new(),
            updated_by: created_by.clone(),
            created_by,
        }
    }

    /// Whether this election currently accepts votes: administratively
    /// `Active` AND inside the scheduled window. State alone is not enough;
    /// an election can be active yet outside its window.
    pub fn is_accepting_votes(&self, now: DateTime<Utc>) -> bool {
        self.state == ElectionState::Active && self.start_time <= now && now <= self.end_time
    }
}

/// A new election ready for DB insertion is just an election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}
