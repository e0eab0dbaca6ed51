use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// Under construction, only visible to admins.
    Draft,
    /// In progress; accepts votes while inside the scheduled window.
    Active,
    /// Administratively suspended; can return to `Active`.
    Paused,
    /// Finished. Terminal.
    Completed,
    /// Abandoned before completion. Terminal.
    Cancelled,
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}

/// How votes are aggregated for an election.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VotingMode {
    SimpleMajority,
    RankedChoice,
    LiquidDemocracy,
    MixedAnonymous,
}

impl From<VotingMode> for Bson {
    fn from(mode: VotingMode) -> Self {
        to_bson(&mode).expect("Serialisation is infallible")
    }
}
