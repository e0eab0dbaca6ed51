//! Client-facing (e.g. JSON-serialisable) types and request guards.

pub mod audit;
pub mod auth;
pub mod candidate;
pub mod election;
pub mod signed;
pub mod vote;

pub use audit::{AuditAppendRequest, AuditEntryView};
pub use candidate::{CandidateSpec, CandidateView};
pub use election::{ElectionDescription, ElectionResults, ElectionSpec, ElectionSummary};
pub use signed::SignedMessage;
pub use vote::{CastVoteRequest, VoteReceipt, VoterStatus};
