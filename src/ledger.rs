//! Client-side protocol for the external vote ledger.
//!
//! The ledger is the contract of record for vote transactions; it is not
//! reimplemented here. The core depends on exactly one operation:
//! [`VoteLedger::submit_vote`], which blocks until the transaction is
//! confirmed, rejected, or the bounded timeout expires. Submissions are
//! never retried automatically.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    common::{VoteType, WalletAddress},
    mongodb::Id,
};

/// One vote, as submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSubmission {
    pub candidate_id: String,
    pub voter: WalletAddress,
    pub vote_type: VoteType,
    pub vote_hash: String,
}

impl VoteSubmission {
    pub fn new(candidate_id: Id, voter: WalletAddress, vote_type: VoteType, vote_hash: String) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            voter,
            vote_type,
            vote_hash,
        }
    }
}

/// Receipt returned by the ledger once a vote transaction is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub confirmed: bool,
    pub txn_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger rejected the vote: {0}")]
    Rejected(String),
    #[error("ledger request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ledger confirmation timed out after {0:?}")]
    Timeout(Duration),
}

/// The one operation the core depends the ledger for.
#[rocket::async_trait]
pub trait VoteLedger: Send + Sync {
    /// Submit a vote transaction and wait for its confirmation. Runs to
    /// completion (confirmation, rejection, or timeout) before returning;
    /// callers must not mutate local state while a submission is in flight.
    async fn submit_vote(&self, submission: &VoteSubmission) -> Result<LedgerReceipt, LedgerError>;
}

/// HTTP client for the ledger contract gateway.
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpLedger {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout,
        }
    }
}

#[rocket::async_trait]
impl VoteLedger for HttpLedger {
    async fn submit_vote(&self, submission: &VoteSubmission) -> Result<LedgerReceipt, LedgerError> {
        let url = format!("{}/votes", self.base_url.trim_end_matches('/'));
        // One deadline covers the whole exchange, including confirmation
        // latency and reading the response body.
        let exchange = async {
            let response = self
                .client
                .post(&url)
                .json(submission)
                .send()
                .await?
                .error_for_status()?;
            let receipt: LedgerReceipt = response.json().await?;
            Ok::<_, LedgerError>(receipt)
        };
        let receipt = match rocket::tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(LedgerError::Timeout(self.timeout)),
        };
        if !receipt.confirmed {
            return Err(LedgerError::Rejected(format!(
                "transaction {} was not confirmed",
                receipt.txn_hash
            )));
        }
        Ok(receipt)
    }
}

/// A scriptable in-memory ledger for tests.
#[cfg(test)]
pub use mock::{MockBehaviour, MockLedger};

#[cfg(test)]
mod mock {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// What the mock should do with the next submissions.
    #[derive(Debug, Copy, Clone)]
    pub enum MockBehaviour {
        /// Confirm immediately.
        Confirm,
        /// Confirm after the given delay, to widen race windows.
        ConfirmAfter(Duration),
        /// Reject the transaction.
        Reject,
        /// Simulate a confirmation timeout.
        Timeout,
    }

    pub struct MockLedger {
        behaviour: Mutex<MockBehaviour>,
        submissions: Mutex<Vec<VoteSubmission>>,
        txn_counter: AtomicU64,
    }

    impl MockLedger {
        pub fn new() -> Self {
            Self {
                behaviour: Mutex::new(MockBehaviour::Confirm),
                submissions: Mutex::new(Vec::new()),
                txn_counter: AtomicU64::new(1),
            }
        }

        pub fn set_behaviour(&self, behaviour: MockBehaviour) {
            *self.behaviour.lock().unwrap() = behaviour;
        }

        /// Every submission seen so far, in arrival order.
        pub fn submissions(&self) -> Vec<VoteSubmission> {
            self.submissions.lock().unwrap().clone()
        }
    }

    #[rocket::async_trait]
    impl VoteLedger for MockLedger {
        async fn submit_vote(
            &self,
            submission: &VoteSubmission,
        ) -> Result<LedgerReceipt, LedgerError> {
            self.submissions.lock().unwrap().push(submission.clone());
            let behaviour = *self.behaviour.lock().unwrap();
            match behaviour {
                MockBehaviour::Confirm => {}
                MockBehaviour::ConfirmAfter(delay) => {
                    rocket::tokio::time::sleep(delay).await;
                }
                MockBehaviour::Reject => {
                    return Err(LedgerError::Rejected("scripted rejection".to_string()));
                }
                MockBehaviour::Timeout => {
                    return Err(LedgerError::Timeout(Duration::from_millis(10)));
                }
            }
            let seq = self.txn_counter.fetch_add(1, Ordering::Relaxed);
            Ok(LedgerReceipt {
                confirmed: true,
                txn_hash: format!("0xf{seq:063x}"),
                block_number: seq,
            })
        }
    }
}
