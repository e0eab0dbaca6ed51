use chrono::{DateTime, Utc};
use mongodb::bson::Bson;
use rocket::serde::json::serde_json::Value as JsonValue;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ActionKind, WalletAddress},
    db::AuditLogEntry,
};

/// A client-facing view of one audit entry, in a stable serialization: the
/// same view is used by the query, export, and append endpoints, so the
/// verification tool can recompute entry hashes from any of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntryView {
    pub entry_hash: String,
    pub action: ActionKind,
    pub actor: WalletAddress,
    pub payload: JsonValue,
    pub timestamp: DateTime<Utc>,
    pub ledger_txn: Option<String>,
    pub block_number: Option<u64>,
}

impl From<AuditLogEntry> for AuditEntryView {
    fn from(entry: AuditLogEntry) -> Self {
        let (ledger_txn, block_number) = match entry.ledger {
            Some(meta) => (Some(meta.ledger_txn), Some(meta.block_number)),
            None => (None, None),
        };
        Self {
            entry_hash: entry.entry_hash,
            action: entry.action,
            actor: entry.actor,
            payload: Bson::Document(entry.payload).into_relaxed_extjson(),
            timestamp: entry.timestamp,
            ledger_txn,
            block_number,
        }
    }
}

/// Request body for the raw append operation. The actor is always the
/// authenticated administrator; it cannot be supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditAppendRequest {
    pub action: ActionKind,
    pub payload: JsonValue,
}
