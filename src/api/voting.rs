use std::sync::Arc;

use chrono::Utc;
use data_encoding::HEXLOWER;
use mongodb::{bson::doc, Client};
use rocket::{serde::json::Json, Route, State};
use sha2::{Digest, Sha256};

use crate::{
    error::{Error, Result},
    ledger::{VoteLedger, VoteSubmission},
    model::{
        api::{auth::AuthToken, CastVoteRequest, VoteReceipt, VoterStatus},
        common::{ActionKind, CandidateStatus, VoteType, WalletAddress},
        db::{AuditLogEntry, Candidate, Election, LedgerMetadata, Settings, VoteRecord, Voter},
        mongodb::{errors::is_write_conflict, Coll, Id},
    },
};

use super::common::{candidate_by_id, current_settings, election_by_id, voter_by_address};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, voter_status]
}

/// Cast a vote: authenticate, authorize, commit to the ledger, then commit
/// locally. The ledger submission runs to completion before any local
/// mutation, and the local commit is a single transaction guarded by the
/// voter's history.
#[post("/elections/<election_id>/votes", data = "<request>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn cast_vote(
    token: AuthToken<Voter>,
    election_id: Id,
    request: Json<CastVoteRequest>,
    voters: Coll<Voter>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    settings: Coll<Settings>,
    audit: Coll<AuditLogEntry>,
    ledger: &State<Arc<dyn VoteLedger>>,
    db_client: &State<Client>,
) -> Result<Json<VoteReceipt>> {
    let request = request.0;

    // The request itself must be signed by the signed-in voter.
    let address = request.signed.verify()?;
    if address != token.address {
        return Err(Error::unauthorized(
            "Signature does not match the signed-in voter",
        ));
    }

    if current_settings(&settings).await?.maintenance_mode {
        return Err(Error::BadRequest(
            "The service is under maintenance".to_string(),
        ));
    }

    // Resolve the candidate and its owning election.
    let candidate = candidate_by_id(request.candidate_id, &candidates).await?;
    if candidate.election_id != election_id {
        return Err(Error::CandidateNotFound);
    }
    let election = election_by_id(election_id, &elections).await?;

    // The election must accept votes right now.
    let now = Utc::now();
    if !election.is_accepting_votes(now) {
        return Err(Error::ElectionNotActive(not_active_reason(&election, now)));
    }

    // The candidate must be standing.
    if candidate.status != CandidateStatus::Active {
        return Err(Error::CandidateNotEligible);
    }

    // Advisory double-vote check: cheap rejection before touching the
    // ledger. The authoritative check is the conditional write below.
    let voter = voter_by_address(&address, &voters).await?;
    if voter.has_voted(&election_id) {
        return Err(Error::AlreadyVoted);
    }

    // Durable commit on the ledger, then the local commit, in a spawned
    // task: once the submission is in flight the operation must run to
    // completion even if the requesting connection goes away, or the
    // ledger could hold a vote local state never saw.
    let receipt = {
        let ledger = ledger.inner().clone();
        let db_client = db_client.inner().clone();
        let voters = voters.clone();
        let candidates = candidates.clone();
        let elections = elections.clone();
        let audit = audit.clone();
        let address = address.clone();
        let voter_id = voter.id;
        let candidate_id = request.candidate_id;
        let vote_type = request.vote_type;
        let vote_hash = vote_hash(&election_id, &candidate_id, &address, &request.signed.message);

        rocket::tokio::spawn(async move {
            let submission =
                VoteSubmission::new(candidate_id, address.clone(), vote_type, vote_hash.clone());
            // Bounded by the ledger client's timeout; on any failure
            // nothing was mutated locally and the whole operation may be
            // retried.
            let receipt = match ledger.submit_vote(&submission).await {
                Ok(receipt) => receipt,
                Err(err) => {
                    warn!(
                        "VOTE_FAILED voter={address} election={election_id} \
                         candidate={candidate_id}: {err}"
                    );
                    return Err(err.into());
                }
            };

            // Local commit: history entry, tallies, and audit entry, atomically.
            let record = VoteRecord {
                election_id,
                candidate_id,
                vote_type,
                ledger_txn: receipt.txn_hash.clone(),
                vote_hash,
                cast_at: Utc::now(),
            };
            let entry = AuditLogEntry::new(
                ActionKind::VoteCast,
                address,
                doc! {
                    "election_id": election_id,
                    "candidate_id": candidate_id,
                    "ledger_txn": receipt.txn_hash.as_str(),
                },
                Some(LedgerMetadata {
                    ledger_txn: receipt.txn_hash.clone(),
                    block_number: receipt.block_number,
                }),
            );
            commit_vote(
                &db_client, &voters, &candidates, &elections, &audit, voter_id, &record, &entry,
            )
            .await?;
            Ok::<_, Error>(receipt)
        })
        .await
        .map_err(|err| Error::Internal(format!("vote commit task failed: {err}")))??
    };

    // Fresh snapshot after the tally update.
    let candidate = candidate_by_id(request.candidate_id, &candidates).await?;
    Ok(Json(VoteReceipt {
        ledger_txn: receipt.txn_hash,
        block_number: receipt.block_number,
        candidate: candidate.into(),
    }))
}

/// Public voting status for a wallet.
#[get("/voters/<address>")]
async fn voter_status(address: WalletAddress, voters: Coll<Voter>) -> Result<Json<VoterStatus>> {
    let status = match voters.find_one(doc! { "address": &address }, None).await? {
        Some(voter) => VoterStatus::from(&voter),
        None => VoterStatus::unregistered(),
    };
    Ok(Json(status))
}

/// Commit an accepted vote in one transaction: append the history record
/// (the authoritative double-vote gate), bump both tallies, and write the
/// audit entry.
///
/// A lost race here means the ledger holds a vote that local state refuses:
/// that is surfaced as [`Error::DuplicateVoteDetectedPostLedger`] for
/// operator reconciliation, never double-counted.
#[allow(clippy::too_many_arguments)]
async fn commit_vote(
    db_client: &Client,
    voters: &Coll<Voter>,
    candidates: &Coll<Candidate>,
    elections: &Coll<Election>,
    audit: &Coll<AuditLogEntry>,
    voter_id: Id,
    record: &VoteRecord,
    entry: &AuditLogEntry,
) -> Result<()> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    match Voter::record_vote(voters, voter_id, record, &mut session).await {
        Ok(true) => {}
        Ok(false) => {
            session.abort_transaction().await?;
            error!(
                "Ledger transaction {} for voter {voter_id} in election {} lost the local race; reconciliation required",
                record.ledger_txn, record.election_id
            );
            return Err(Error::DuplicateVoteDetectedPostLedger);
        }
        Err(Error::Db(err)) if is_write_conflict(&err) => {
            session.abort_transaction().await?;
            error!(
                "Ledger transaction {} for voter {voter_id} in election {} hit a write conflict; reconciliation required",
                record.ledger_txn, record.election_id
            );
            return Err(Error::DuplicateVoteDetectedPostLedger);
        }
        Err(err) => {
            session.abort_transaction().await?;
            return Err(err);
        }
    }

    // Tally updates are atomic increments keyed by ID; never a
    // read-modify-write of the whole document.
    let mut inc = doc! { "vote_count": 1 };
    if record.vote_type == VoteType::Delegated {
        inc.insert("delegated_vote_count", 1);
    }
    candidates
        .update_one_with_session(
            record.candidate_id.as_doc(),
            doc! { "$inc": inc },
            None,
            &mut session,
        )
        .await?;
    elections
        .update_one_with_session(
            record.election_id.as_doc(),
            doc! { "$inc": { "vote_count": 1 } },
            None,
            &mut session,
        )
        .await?;

    entry.append_with_session(audit, &mut session).await?;

    session.commit_transaction().await?;
    Ok(())
}

/// Why an election is not accepting votes, for the rejection message.
fn not_active_reason(election: &Election, now: chrono::DateTime<Utc>) -> String {
    use crate::model::common::ElectionState;
    match election.state {
        ElectionState::Active if now < election.start_time => {
            format!("election {} has not opened yet", election.id)
        }
        ElectionState::Active => format!("election {} has closed", election.id),
        state => format!("election {} is {state:?}", election.id),
    }
}

/// Content hash binding a vote to its election, candidate, voter, and
/// signed message.
fn vote_hash(election_id: &Id, candidate_id: &Id, voter: &WalletAddress, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(election_id.to_string().as_bytes());
    hasher.update(candidate_id.to_string().as_bytes());
    hasher.update(voter.as_str().as_bytes());
    hasher.update(message.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}
