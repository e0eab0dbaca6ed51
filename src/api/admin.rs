use chrono::Utc;
use mongodb::{
    bson::{doc, to_document, Bson, DateTime as BsonDateTime, Document},
    Client,
};
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{AdminUser, AuthToken},
            ElectionDescription, ElectionSpec,
        },
        common::{ActionKind, ElectionState},
        db::{AuditLogEntry, Candidate, Election, NewElection, Settings, SettingsCore},
        mongodb::{Coll, Id},
    },
};

use super::common::election_by_id;

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        modify_election,
        delete_election,
        start_election,
        stop_election,
        pause_election,
        resume_election,
        cancel_election,
        get_settings,
        update_settings,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<AdminUser>,
    spec: Json<ElectionSpec>,
    new_elections: Coll<NewElection>,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<ElectionDescription>> {
    let election = spec.0.into_election(token.address.clone())?;
    let new_id: Id = new_elections
        .insert_one(&election, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB
        .into();

    let election = elections
        .find_one(new_id.as_doc(), None)
        .await?
        .unwrap();

    AuditLogEntry::new(
        ActionKind::ElectionCreated,
        token.address,
        doc! { "election_id": new_id, "title": election.title.as_str() },
        None,
    )
    .append(&audit)
    .await?;

    Ok(Json(election.into()))
}

#[put("/elections/<election_id>", data = "<spec>", format = "json")]
async fn modify_election(
    token: AuthToken<AdminUser>,
    election_id: Id,
    spec: Json<ElectionSpec>,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<ElectionDescription>> {
    // Validate the new metadata via the same path as creation.
    let proto = spec.0.into_election(token.address.clone())?;

    // Only drafts are modifiable; published scheduling is immutable.
    let filter = doc! {
        "_id": election_id,
        "state": ElectionState::Draft,
    };
    let update = doc! {
        "$set": {
            "title": proto.title.as_str(),
            "description": proto.description.as_str(),
            "voting_mode": proto.voting_mode,
            "start_time": BsonDateTime::from_chrono(proto.start_time),
            "end_time": BsonDateTime::from_chrono(proto.end_time),
            "updated_by": &token.address,
        }
    };
    let result = elections.update_one(filter, update, None).await?;
    if result.matched_count != 1 {
        return match elections.find_one(election_id.as_doc(), None).await? {
            None => Err(Error::not_found(format!("Election {election_id}"))),
            Some(election) => Err(Error::BadRequest(format!(
                "Cannot modify election {election_id} in state {:?}",
                election.state
            ))),
        };
    }

    AuditLogEntry::new(
        ActionKind::ElectionUpdated,
        token.address,
        doc! { "election_id": election_id },
        None,
    )
    .append(&audit)
    .await?;

    let election = elections
        .find_one(election_id.as_doc(), None)
        .await?
        .unwrap();
    Ok(Json(election.into()))
}

#[delete("/elections/<election_id>")]
async fn delete_election(
    token: AuthToken<AdminUser>,
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    audit: Coll<AuditLogEntry>,
    db_client: &State<Client>,
) -> Result<()> {
    let election = election_by_id(election_id, &elections).await?;
    if !matches!(
        election.state,
        ElectionState::Draft | ElectionState::Cancelled
    ) {
        return Err(Error::BadRequest(format!(
            "Cannot delete election {election_id} in state {:?}",
            election.state
        )));
    }

    // Atomically delete the election and its candidates. Audit entries are
    // immutable and deliberately survive the deletion.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let result = elections
        .delete_one_with_session(election_id.as_doc(), None, &mut session)
        .await?;
    assert_eq!(result.deleted_count, 1);

    candidates
        .delete_many_with_session(doc! { "election_id": election_id }, None, &mut session)
        .await?;

    AuditLogEntry::new(
        ActionKind::ElectionDeleted,
        token.address,
        doc! { "election_id": election_id, "title": election.title.as_str() },
        None,
    )
    .append_with_session(&audit, &mut session)
    .await?;

    session.commit_transaction().await?;
    Ok(())
}

#[post("/elections/<election_id>/start")]
async fn start_election(
    token: AuthToken<AdminUser>,
    election_id: Id,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<ElectionDescription>> {
    let update = doc! {
        "state": ElectionState::Active,
        "actual_start": BsonDateTime::from_chrono(Utc::now()),
        "updated_by": &token.address,
    };
    let election = transition_election(
        election_id,
        ElectionState::Draft.into(),
        update,
        &elections,
        "start",
    )
    .await?;

    AuditLogEntry::new(
        ActionKind::ElectionStarted,
        token.address,
        doc! { "election_id": election_id },
        None,
    )
    .append(&audit)
    .await?;

    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/stop")]
async fn stop_election(
    token: AuthToken<AdminUser>,
    election_id: Id,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<ElectionDescription>> {
    let update = doc! {
        "state": ElectionState::Completed,
        "actual_end": BsonDateTime::from_chrono(Utc::now()),
        "updated_by": &token.address,
    };
    let election = transition_election(
        election_id,
        ElectionState::Active.into(),
        update,
        &elections,
        "stop",
    )
    .await?;

    AuditLogEntry::new(
        ActionKind::ElectionStopped,
        token.address,
        doc! { "election_id": election_id },
        None,
    )
    .append(&audit)
    .await?;

    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/pause")]
async fn pause_election(
    token: AuthToken<AdminUser>,
    election_id: Id,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<ElectionDescription>> {
    let update = doc! {
        "state": ElectionState::Paused,
        "updated_by": &token.address,
    };
    let election = transition_election(
        election_id,
        ElectionState::Active.into(),
        update,
        &elections,
        "pause",
    )
    .await?;

    append_transition_audit(&audit, token, election_id, "paused").await?;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/resume")]
async fn resume_election(
    token: AuthToken<AdminUser>,
    election_id: Id,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<ElectionDescription>> {
    let update = doc! {
        "state": ElectionState::Active,
        "updated_by": &token.address,
    };
    let election = transition_election(
        election_id,
        ElectionState::Paused.into(),
        update,
        &elections,
        "resume",
    )
    .await?;

    append_transition_audit(&audit, token, election_id, "resumed").await?;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/cancel")]
async fn cancel_election(
    token: AuthToken<AdminUser>,
    election_id: Id,
    elections: Coll<Election>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<ElectionDescription>> {
    // Terminal escape hatch, reachable from draft or active only.
    let state_filter = doc! {
        "$in": [ElectionState::Draft, ElectionState::Active],
    };
    let update = doc! {
        "state": ElectionState::Cancelled,
        "actual_end": BsonDateTime::from_chrono(Utc::now()),
        "updated_by": &token.address,
    };
    let election = transition_election(
        election_id,
        state_filter.into(),
        update,
        &elections,
        "cancel",
    )
    .await?;

    append_transition_audit(&audit, token, election_id, "cancelled").await?;
    Ok(Json(election.into()))
}

#[get("/settings")]
async fn get_settings(
    _token: AuthToken<AdminUser>,
    settings: Coll<Settings>,
) -> Result<Json<SettingsCore>> {
    let current = super::common::current_settings(&settings).await?;
    Ok(Json(*current))
}

#[put("/settings", data = "<new_settings>", format = "json")]
async fn update_settings(
    token: AuthToken<AdminUser>,
    new_settings: Json<SettingsCore>,
    settings: Coll<Settings>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<SettingsCore>> {
    let as_doc = to_document(&new_settings.0)?;
    settings
        .update_one(doc! {}, doc! { "$set": &as_doc }, None)
        .await?;

    AuditLogEntry::new(ActionKind::SettingsUpdated, token.address, as_doc, None)
        .append(&audit)
        .await?;

    Ok(new_settings)
}

/// Apply a lifecycle transition as one conditional write: the filter pins
/// the expected current state, so a concurrent competing transition makes
/// this one fail cleanly instead of clobbering it.
async fn transition_election(
    election_id: Id,
    state_filter: Bson,
    set: Document,
    elections: &Coll<Election>,
    describe: &str,
) -> Result<Election> {
    let filter = doc! {
        "_id": election_id,
        "state": state_filter,
    };
    let result = elections
        .update_one(filter, doc! { "$set": set }, None)
        .await?;
    if result.modified_count != 1 {
        return match elections.find_one(election_id.as_doc(), None).await? {
            None => Err(Error::not_found(format!("Election {election_id}"))),
            Some(election) => Err(Error::InvalidTransition(format!(
                "cannot {describe} election {election_id} in state {:?}",
                election.state
            ))),
        };
    }
    Ok(elections
        .find_one(election_id.as_doc(), None)
        .await?
        .unwrap()) // Presence just checked.
}

/// Audit a pause/resume/cancel transition. These have no dedicated action
/// kind; they are recorded as election updates with a transition payload.
async fn append_transition_audit(
    audit: &Coll<AuditLogEntry>,
    token: AuthToken<AdminUser>,
    election_id: Id,
    transition: &str,
) -> Result<()> {
    AuditLogEntry::new(
        ActionKind::ElectionUpdated,
        token.address,
        doc! { "election_id": election_id, "transition": transition },
        None,
    )
    .append(audit)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::serde_json,
    };

    use crate::model::db::NewCandidate;

    use super::*;

    #[backend_test(admin)]
    async fn create_election(client: Client, db: Database) {
        let spec = ElectionSpec::future_example();
        let description = create_election_for_spec(&client, &spec).await;
        assert_eq!(description.title, spec.title);
        assert_eq!(description.state, ElectionState::Draft);
        assert_eq!(description.vote_count, 0);

        // Present in the DB.
        let election = get_election_by_id(&db, &description.id).await;
        assert_eq!(election.title, spec.title);
        assert_eq!(election.state, ElectionState::Draft);

        // Audited.
        let entry = Coll::<AuditLogEntry>::from_db(&db)
            .find_one(doc! { "action": ActionKind::ElectionCreated }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            entry.payload.get_object_id("election_id").unwrap(),
            *election.id
        );
    }

    #[backend_test(admin)]
    async fn create_rejects_bad_window(client: Client) {
        let mut spec = ElectionSpec::future_example();
        std::mem::swap(&mut spec.start_time, &mut spec.end_time);
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[backend_test(voter)]
    async fn non_admins_are_refused(client: Client) {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&ElectionSpec::future_example()).unwrap())
            .dispatch()
            .await;
        // The admin guard forwards, and nothing else matches.
        assert_eq!(response.status(), Status::NotFound);
    }

    #[backend_test(admin)]
    async fn start_stop_lifecycle(client: Client, db: Database) {
        let election = create_election_for_spec(&client, &ElectionSpec::current_example()).await;
        let id = &election.id;

        // Start it.
        transition(&client, id, "start", Status::Ok).await;
        let started = get_election_by_id(&db, id).await;
        assert_eq!(started.state, ElectionState::Active);
        assert!(started.actual_start.is_some());

        // A second start must fail and leave the state untouched.
        transition(&client, id, "start", Status::BadRequest).await;
        let after = get_election_by_id(&db, id).await;
        assert_eq!(after.state, ElectionState::Active);
        assert_eq!(after.actual_start, started.actual_start);

        // Stop it.
        transition(&client, id, "stop", Status::Ok).await;
        let stopped = get_election_by_id(&db, id).await;
        assert_eq!(stopped.state, ElectionState::Completed);
        assert!(stopped.actual_end.is_some());

        // Completed is terminal.
        transition(&client, id, "stop", Status::BadRequest).await;
        transition(&client, id, "start", Status::BadRequest).await;
        transition(&client, id, "cancel", Status::BadRequest).await;

        // Both transitions were audited.
        for kind in [ActionKind::ElectionStarted, ActionKind::ElectionStopped] {
            let entry = Coll::<AuditLogEntry>::from_db(&db)
                .find_one(doc! { "action": kind }, None)
                .await
                .unwrap();
            assert!(entry.is_some(), "{kind} not audited");
        }
    }

    #[backend_test(admin)]
    async fn pause_resume_cycle(client: Client, db: Database) {
        let election = create_election_for_spec(&client, &ElectionSpec::current_example()).await;
        let id = &election.id;

        // Drafts cannot be paused.
        transition(&client, id, "pause", Status::BadRequest).await;

        transition(&client, id, "start", Status::Ok).await;
        transition(&client, id, "pause", Status::Ok).await;
        assert_eq!(
            get_election_by_id(&db, id).await.state,
            ElectionState::Paused
        );

        // A paused election must be resumed before it can be cancelled.
        transition(&client, id, "cancel", Status::BadRequest).await;

        transition(&client, id, "resume", Status::Ok).await;
        assert_eq!(
            get_election_by_id(&db, id).await.state,
            ElectionState::Active
        );

        transition(&client, id, "cancel", Status::Ok).await;
        let cancelled = get_election_by_id(&db, id).await;
        assert_eq!(cancelled.state, ElectionState::Cancelled);

        // Cancelled is terminal.
        transition(&client, id, "resume", Status::BadRequest).await;
        transition(&client, id, "start", Status::BadRequest).await;
    }

    #[backend_test(admin)]
    async fn transitions_on_missing_elections_are_not_found(client: Client) {
        let bogus = Id::new().to_string();
        transition(&client, &bogus, "start", Status::NotFound).await;
        transition(&client, &bogus, "stop", Status::NotFound).await;
    }

    #[backend_test(admin)]
    async fn modify_only_drafts(client: Client, db: Database) {
        let election = create_election_for_spec(&client, &ElectionSpec::future_example()).await;
        let id = &election.id;

        // Modify while a draft.
        let mut spec = ElectionSpec::future_example();
        spec.title = "Renamed".to_string();
        let response = client
            .put(uri!(modify_election(id.parse::<Id>().unwrap())))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(get_election_by_id(&db, id).await.title, "Renamed");

        // Not after starting.
        transition(&client, id, "start", Status::Ok).await;
        let response = client
            .put(uri!(modify_election(id.parse::<Id>().unwrap())))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&ElectionSpec::future_example()).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(get_election_by_id(&db, id).await.title, "Renamed");
    }

    #[backend_test(admin)]
    async fn delete_cascades_to_candidates(client: Client, db: Database) {
        let election = create_election_for_spec(&client, &ElectionSpec::future_example()).await;
        let id: Id = election.id.parse().unwrap();

        // Insert candidates directly.
        let candidates = Coll::<NewCandidate>::from_db(&db);
        candidates
            .insert_many(
                vec![
                    NewCandidate::new(id, "Alice Chen".to_string(), None, "".to_string()),
                    NewCandidate::new(id, "Bob Osei".to_string(), None, "".to_string()),
                ],
                None,
            )
            .await
            .unwrap();

        // Active elections cannot be deleted.
        transition(&client, &election.id, "start", Status::Ok).await;
        let response = client.delete(uri!(delete_election(id))).dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);

        // Cancelled ones can.
        transition(&client, &election.id, "cancel", Status::Ok).await;
        let response = client.delete(uri!(delete_election(id))).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        assert!(Coll::<Election>::from_db(&db)
            .find_one(id.as_doc(), None)
            .await
            .unwrap()
            .is_none());
        let remaining = Coll::<Candidate>::from_db(&db)
            .count_documents(doc! { "election_id": id }, None)
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        // The deletion itself is audited, and earlier entries survive.
        let audit = Coll::<AuditLogEntry>::from_db(&db);
        assert!(audit
            .find_one(doc! { "action": ActionKind::ElectionDeleted }, None)
            .await
            .unwrap()
            .is_some());
        assert!(audit
            .find_one(doc! { "action": ActionKind::ElectionCreated }, None)
            .await
            .unwrap()
            .is_some());
    }

    #[backend_test(admin)]
    async fn settings_updates_are_audited(client: Client, db: Database) {
        let new_settings = SettingsCore {
            registration_open: false,
            candidate_registration_open: false,
            maintenance_mode: true,
        };
        let response = client
            .put(uri!(update_settings))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&new_settings).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let stored = Coll::<Settings>::from_db(&db)
            .find_one(None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*stored, new_settings);

        let entry = Coll::<AuditLogEntry>::from_db(&db)
            .find_one(doc! { "action": ActionKind::SettingsUpdated }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.payload.get_bool("maintenance_mode").unwrap(), true);
    }

    async fn get_election_by_id(db: &Database, id: &str) -> Election {
        Coll::<Election>::from_db(db)
            .find_one(id.parse::<Id>().unwrap().as_doc(), None)
            .await
            .unwrap()
            .unwrap()
    }

    async fn create_election_for_spec(client: &Client, spec: &ElectionSpec) -> ElectionDescription {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(serde_json::to_string(spec).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    async fn transition<'c>(
        client: &'c Client,
        id: &str,
        verb: &str,
        expected: Status,
    ) -> LocalResponse<'c> {
        let id: Id = id.parse().unwrap();
        let uri = match verb {
            "start" => uri!(start_election(id)),
            "stop" => uri!(stop_election(id)),
            "pause" => uri!(pause_election(id)),
            "resume" => uri!(resume_election(id)),
            "cancel" => uri!(cancel_election(id)),
            other => panic!("unknown transition {other}"),
        };
        let response = client.post(uri).dispatch().await;
        assert_eq!(response.status(), expected, "transition {verb}");
        response
    }
}
