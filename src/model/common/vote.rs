use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// How a vote reaches the ledger. Delegation, mixing, and ZK submission are
/// alternative payloads behind the same `submit_vote` contract; the casting
/// protocol is identical for all of them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteType {
    Direct,
    Delegated,
    Mixed,
    ZkProof,
}

impl Default for VoteType {
    fn default() -> Self {
        Self::Direct
    }
}

impl From<VoteType> for Bson {
    fn from(vote_type: VoteType) -> Self {
        to_bson(&vote_type).expect("Serialisation is infallible")
    }
}
