//! Domain vocabulary shared between the API and DB layers.

mod address;
pub use address::{AddressParseError, WalletAddress};

mod audit;
pub use audit::ActionKind;

mod candidate;
pub use candidate::CandidateStatus;

mod election;
pub use election::{ElectionState, VotingMode};

mod vote;
pub use vote::VoteType;
