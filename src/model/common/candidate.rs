use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Candidate lifecycle.
///
/// Only `Active` candidates may receive votes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStatus {
    /// Registered but awaiting admin review.
    Pending,
    /// Approved; eligible to receive votes while the election runs.
    Active,
    /// Rejected during review. Terminal.
    Rejected,
    /// Withdrawn from the race after approval. Terminal.
    Withdrawn,
}

impl From<CandidateStatus> for Bson {
    fn from(status: CandidateStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
