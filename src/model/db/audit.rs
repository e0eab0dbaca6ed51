use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use mongodb::{
    bson::{serde_helpers::chrono_datetime_as_bson_datetime, Bson, Document},
    ClientSession,
};
use rocket::serde::json::serde_json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::model::{
    common::{ActionKind, WalletAddress},
    mongodb::{errors::is_duplicate_key_error, Coll},
};

/// Ledger metadata carried by audit entries for ledger-backed actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    /// Ledger transaction reference.
    pub ledger_txn: String,
    /// Block the transaction was included in.
    pub block_number: u64,
}

/// One immutable record of a state-changing action.
///
/// The entry's identifier is derived from its content, so two byte-identical
/// actions within the same millisecond collapse into one entry at the
/// storage layer; that collision is benign. Entries are never updated or
/// deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Content hash over `(action, actor, payload, timestamp)`.
    #[serde(rename = "_id")]
    pub entry_hash: String,
    /// What happened.
    pub action: ActionKind,
    /// Who did it.
    pub actor: WalletAddress,
    /// Action-specific details. Opaque to the audit trail itself.
    pub payload: Document,
    /// When it happened.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    /// Ledger transaction metadata, for actions that went through the ledger.
    pub ledger: Option<LedgerMetadata>,
}

impl AuditLogEntry {
    /// Build an entry stamped with the current instant.
    pub fn new(
        action: ActionKind,
        actor: WalletAddress,
        payload: Document,
        ledger: Option<LedgerMetadata>,
    ) -> Self {
        let timestamp = Utc::now();
        let entry_hash = Self::content_hash(action, &actor, &payload, timestamp);
        Self {
            entry_hash,
            action,
            actor,
            payload,
            timestamp,
            ledger,
        }
    }

    /// The deterministic content hash identifying an entry.
    ///
    /// The payload is hashed via its relaxed extended JSON rendering with
    /// sorted keys, so the hash survives a trip through the database and
    /// the export endpoint. The timestamp enters at millisecond
    /// granularity, matching what the database stores.
    pub fn content_hash(
        action: ActionKind,
        actor: &WalletAddress,
        payload: &Document,
        timestamp: DateTime<Utc>,
    ) -> String {
        let payload_json = serde_json::to_string(&Bson::Document(payload.clone()).into_relaxed_extjson())
            .expect("JSON serialisation is infallible");
        let mut hasher = Sha256::new();
        hasher.update(action.as_str().as_bytes());
        hasher.update(actor.as_str().as_bytes());
        hasher.update(payload_json.as_bytes());
        hasher.update(timestamp.timestamp_millis().to_le_bytes());
        HEXLOWER.encode(&hasher.finalize())
    }

    /// Append this entry to the log. A duplicate identifier means the exact
    /// same action was already recorded within the same millisecond; that
    /// is treated as a benign no-op, not an error.
    pub async fn append(self, audit: &Coll<AuditLogEntry>) -> Result<AuditLogEntry> {
        match audit.insert_one(&self, None).await {
            Ok(_) => Ok(self),
            Err(err) if is_duplicate_key_error(&err) => {
                debug!("Benign duplicate audit entry {}", self.entry_hash);
                Ok(self)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Append inside a transaction, for actions whose audit record must
    /// commit atomically with the state they change.
    pub async fn append_with_session(
        &self,
        audit: &Coll<AuditLogEntry>,
        session: &mut ClientSession,
    ) -> Result<()> {
        match audit.insert_one_with_session(self, None, session).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => {
                debug!("Benign duplicate audit entry {}", self.entry_hash);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
