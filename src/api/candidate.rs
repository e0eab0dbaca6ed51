use chrono::Utc;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    Client,
};
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{AdminUser, AuthToken},
            CandidateSpec, CandidateView,
        },
        common::{ActionKind, CandidateStatus, ElectionState},
        db::{AuditLogEntry, Candidate, Election, NewCandidate, Settings},
        mongodb::{errors::is_duplicate_key_error, Coll, Id},
    },
};

use super::common::{candidate_by_id, current_settings, election_by_id};

pub fn routes() -> Vec<Route> {
    routes![
        register_candidate,
        approve_candidate,
        reject_candidate,
        withdraw_candidate,
        update_candidate,
        delete_candidate,
    ]
}

/// Register a candidate for a draft election, pending review.
#[post("/elections/<election_id>/candidates", data = "<spec>", format = "json")]
async fn register_candidate(
    token: AuthToken<AdminUser>,
    election_id: Id,
    spec: Json<CandidateSpec>,
    elections: Coll<Election>,
    new_candidates: Coll<NewCandidate>,
    candidates: Coll<Candidate>,
    settings: Coll<Settings>,
    audit: Coll<AuditLogEntry>,
    db_client: &State<Client>,
) -> Result<Json<CandidateView>> {
    let settings = current_settings(&settings).await?;
    if !settings.candidate_registration_open {
        return Err(Error::BadRequest(
            "Candidate registration is currently closed".to_string(),
        ));
    }

    let election = election_by_id(election_id, &elections).await?;
    if election.state != ElectionState::Draft {
        return Err(Error::BadRequest(format!(
            "Candidates can only be registered while election {election_id} is a draft"
        )));
    }

    let name = spec.0.name.clone();
    let candidate = NewCandidate::new(election_id, spec.0.name, spec.0.party, spec.0.description);

    // Insert the candidate and link it from the election atomically.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let new_id: Id = match new_candidates
        .insert_one_with_session(&candidate, None, &mut session)
        .await
    {
        Ok(result) => result.inserted_id.as_object_id().unwrap().into(),
        Err(err) if is_duplicate_key_error(&err) => {
            session.abort_transaction().await?;
            return Err(Error::BadRequest(format!(
                "Candidate '{name}' is already registered for election {election_id}"
            )));
        }
        Err(err) => {
            session.abort_transaction().await?;
            return Err(err.into());
        }
    };

    elections
        .update_one_with_session(
            election_id.as_doc(),
            doc! { "$push": { "candidates": new_id } },
            None,
            &mut session,
        )
        .await?;

    AuditLogEntry::new(
        ActionKind::CandidateRegistered,
        token.address,
        doc! { "election_id": election_id, "candidate_id": new_id, "name": name.as_str() },
        None,
    )
    .append_with_session(&audit, &mut session)
    .await?;

    session.commit_transaction().await?;

    let candidate = candidate_by_id(new_id, &candidates).await?;
    Ok(Json(candidate.into()))
}

#[post("/candidates/<candidate_id>/approve")]
async fn approve_candidate(
    token: AuthToken<AdminUser>,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<CandidateView>> {
    let candidate = review_candidate(
        candidate_id,
        CandidateStatus::Pending,
        CandidateStatus::Active,
        &token,
        &candidates,
        "approve",
    )
    .await?;

    append_candidate_audit(&audit, token, ActionKind::CandidateApproved, &candidate, None).await?;
    Ok(Json(candidate.into()))
}

#[post("/candidates/<candidate_id>/reject")]
async fn reject_candidate(
    token: AuthToken<AdminUser>,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<CandidateView>> {
    let candidate = review_candidate(
        candidate_id,
        CandidateStatus::Pending,
        CandidateStatus::Rejected,
        &token,
        &candidates,
        "reject",
    )
    .await?;

    append_candidate_audit(&audit, token, ActionKind::CandidateRejected, &candidate, None).await?;
    Ok(Json(candidate.into()))
}

/// Withdraw an approved candidate from the race. They stop being eligible
/// for votes; any votes already received stay counted.
#[post("/candidates/<candidate_id>/withdraw")]
async fn withdraw_candidate(
    token: AuthToken<AdminUser>,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<CandidateView>> {
    let candidate = review_candidate(
        candidate_id,
        CandidateStatus::Active,
        CandidateStatus::Withdrawn,
        &token,
        &candidates,
        "withdraw",
    )
    .await?;

    append_candidate_audit(
        &audit,
        token,
        ActionKind::CandidateUpdated,
        &candidate,
        Some("withdrawn"),
    )
    .await?;
    Ok(Json(candidate.into()))
}

#[put("/candidates/<candidate_id>", data = "<spec>", format = "json")]
async fn update_candidate(
    token: AuthToken<AdminUser>,
    candidate_id: Id,
    spec: Json<CandidateSpec>,
    candidates: Coll<Candidate>,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<CandidateView>> {
    let candidate = candidate_by_id(candidate_id, &candidates).await?;
    let election = election_by_id(candidate.election_id, &elections).await?;
    if election.state != ElectionState::Draft {
        return Err(Error::BadRequest(format!(
            "Candidates can only be updated while election {} is a draft",
            candidate.election_id
        )));
    }

    let update = doc! {
        "$set": {
            "name": spec.0.name.as_str(),
            "party": spec.0.party.as_deref(),
            "description": spec.0.description.as_str(),
        }
    };
    match candidates.update_one(candidate_id.as_doc(), update, None).await {
        Ok(_) => {}
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::BadRequest(format!(
                "Candidate '{}' is already registered for election {}",
                spec.0.name, candidate.election_id
            )));
        }
        Err(err) => return Err(err.into()),
    }

    let candidate = candidate_by_id(candidate_id, &candidates).await?;
    append_candidate_audit(&audit, token, ActionKind::CandidateUpdated, &candidate, None).await?;
    Ok(Json(candidate.into()))
}

#[delete("/candidates/<candidate_id>")]
async fn delete_candidate(
    token: AuthToken<AdminUser>,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
    db_client: &State<Client>,
) -> Result<()> {
    let candidate = candidate_by_id(candidate_id, &candidates).await?;
    let election = election_by_id(candidate.election_id, &elections).await?;
    if election.state != ElectionState::Draft {
        return Err(Error::BadRequest(format!(
            "Candidates can only be deleted while election {} is a draft",
            candidate.election_id
        )));
    }

    // Atomically remove the candidate and unlink it from the election.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let result = candidates
        .delete_one_with_session(candidate_id.as_doc(), None, &mut session)
        .await?;
    assert_eq!(result.deleted_count, 1);

    elections
        .update_one_with_session(
            candidate.election_id.as_doc(),
            doc! { "$pull": { "candidates": candidate_id } },
            None,
            &mut session,
        )
        .await?;

    AuditLogEntry::new(
        ActionKind::CandidateDeleted,
        token.address,
        doc! {
            "election_id": candidate.election_id,
            "candidate_id": candidate_id,
            "name": candidate.name.as_str(),
        },
        None,
    )
    .append_with_session(&audit, &mut session)
    .await?;

    session.commit_transaction().await?;
    Ok(())
}

/// Apply a review-state transition as one conditional write, recording the
/// reviewing administrator.
async fn review_candidate(
    candidate_id: Id,
    from: CandidateStatus,
    to: CandidateStatus,
    token: &AuthToken<AdminUser>,
    candidates: &Coll<Candidate>,
    describe: &str,
) -> Result<Candidate> {
    let filter = doc! {
        "_id": candidate_id,
        "status": from,
    };
    let update = doc! {
        "$set": {
            "status": to,
            "reviewed_by": &token.address,
            "reviewed_at": BsonDateTime::from_chrono(Utc::now()),
        }
    };
    let result = candidates.update_one(filter, update, None).await?;
    if result.modified_count != 1 {
        return match candidates.find_one(candidate_id.as_doc(), None).await? {
            None => Err(Error::CandidateNotFound),
            Some(candidate) => Err(Error::BadRequest(format!(
                "cannot {describe} candidate {candidate_id} in status {:?}",
                candidate.status
            ))),
        };
    }
    Ok(candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .unwrap()) // Presence just checked.
}

async fn append_candidate_audit(
    audit: &Coll<AuditLogEntry>,
    token: AuthToken<AdminUser>,
    kind: ActionKind,
    candidate: &Candidate,
    transition: Option<&str>,
) -> Result<()> {
    let mut payload: Document = doc! {
        "election_id": candidate.election_id,
        "candidate_id": candidate.id,
        "name": candidate.name.as_str(),
    };
    if let Some(transition) = transition {
        payload.insert("transition", transition);
    }
    AuditLogEntry::new(kind, token.address, payload, None)
        .append(audit)
        .await?;
    Ok(())
}
