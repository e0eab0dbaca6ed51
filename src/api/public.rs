use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{AdminUser, AuthToken},
            CandidateView, ElectionDescription, ElectionResults, ElectionSummary,
        },
        common::ElectionState,
        db::{Candidate, Election},
        mongodb::{Coll, Id},
    },
};

use super::common::election_by_id;

pub fn routes() -> Vec<Route> {
    routes![
        elections_admin,
        elections_non_admin,
        election_admin,
        election_non_admin,
        election_candidates,
        election_results,
    ]
}

#[get("/elections", rank = 1)]
async fn elections_admin(
    _token: AuthToken<AdminUser>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionSummary>>> {
    list_elections(elections, true).await
}

#[get("/elections", rank = 2)]
async fn elections_non_admin(elections: Coll<Election>) -> Result<Json<Vec<ElectionSummary>>> {
    list_elections(elections, false).await
}

#[get("/elections/<election_id>", rank = 1)]
async fn election_admin(
    _token: AuthToken<AdminUser>,
    election_id: Id,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let election = election_by_id(election_id, &elections).await?;
    Ok(Json(election.into()))
}

#[get("/elections/<election_id>", rank = 2)]
async fn election_non_admin(
    election_id: Id,
    elections: Coll<Election>,
) -> Result<Json<ElectionDescription>> {
    let election = visible_election(election_id, &elections).await?;
    Ok(Json(election.into()))
}

#[get("/elections/<election_id>/candidates")]
async fn election_candidates(
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateView>>> {
    let _ = visible_election(election_id, &elections).await?;
    let list: Vec<Candidate> = candidates
        .find(doc! { "election_id": election_id }, None)
        .await?
        .try_collect()
        .await?;
    Ok(Json(list.into_iter().map(Into::into).collect()))
}

/// The local tally, kept for fast reads; the ledger remains the source of
/// truth for the existence of each vote transaction.
#[get("/elections/<election_id>/results")]
async fn election_results(
    election_id: Id,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<ElectionResults>> {
    let election = visible_election(election_id, &elections).await?;
    let list: Vec<Candidate> = candidates
        .find(doc! { "election_id": election_id }, None)
        .await?
        .try_collect()
        .await?;
    Ok(Json(ElectionResults {
        total_votes: election.vote_count,
        candidates: list.into_iter().map(Into::into).collect(),
        election: election.into(),
    }))
}

async fn list_elections(
    elections: Coll<Election>,
    include_drafts: bool,
) -> Result<Json<Vec<ElectionSummary>>> {
    let filter =
        (!include_drafts).then(|| doc! { "state": { "$ne": ElectionState::Draft } });
    let list: Vec<Election> = elections.find(filter, None).await?.try_collect().await?;
    Ok(Json(list.into_iter().map(Into::into).collect()))
}

/// Fetch an election, hiding drafts from non-admins.
async fn visible_election(election_id: Id, elections: &Coll<Election>) -> Result<Election> {
    let election = election_by_id(election_id, elections).await?;
    if election.state == ElectionState::Draft {
        return Err(Error::not_found(format!("Election {election_id}")));
    }
    Ok(election)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use mongodb::Database;
    use rocket::{http::Status, local::asynchronous::Client, serde::json::serde_json};

    use crate::model::{
        common::{CandidateStatus, VotingMode, WalletAddress},
        db::{ElectionCore, NewCandidate},
    };

    use super::*;

    #[backend_test]
    async fn drafts_hidden_from_public(client: Client, db: Database) {
        let draft = insert_election(&db, ElectionState::Draft).await;
        let active = insert_election(&db, ElectionState::Active).await;

        let response = client.get(uri!(elections_non_admin)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let summaries: Vec<ElectionSummary> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, active.to_string());

        let response = client
            .get(format!("/elections/{draft}"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        let response = client
            .get(format!("/elections/{draft}/results"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[backend_test(admin)]
    async fn admins_see_drafts(client: Client, db: Database) {
        let draft = insert_election(&db, ElectionState::Draft).await;

        let response = client.get(uri!(elections_admin)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let summaries: Vec<ElectionSummary> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(summaries.len(), 1);

        let response = client
            .get(format!("/elections/{draft}"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[backend_test]
    async fn results_reflect_tallies(client: Client, db: Database) {
        let election_id = insert_election(&db, ElectionState::Active).await;
        let candidates = Coll::<NewCandidate>::from_db(&db);
        for (name, votes) in [("Alice Chen", 2u64), ("Bob Osei", 1u64)] {
            let mut candidate =
                NewCandidate::new(election_id, name.to_string(), None, "".to_string());
            candidate.status = CandidateStatus::Active;
            candidate.vote_count = votes;
            candidates.insert_one(&candidate, None).await.unwrap();
        }
        Coll::<Election>::from_db(&db)
            .update_one(
                election_id.as_doc(),
                doc! { "$set": { "vote_count": 3_i64 } },
                None,
            )
            .await
            .unwrap();

        let response = client
            .get(format!("/elections/{election_id}/results"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let results: ElectionResults =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(results.total_votes, 3);
        assert_eq!(
            results
                .candidates
                .iter()
                .map(|c| c.vote_count)
                .sum::<u64>(),
            results.total_votes
        );
    }

    async fn insert_election(db: &Database, state: ElectionState) -> Id {
        let now = Utc::now();
        let admin: WalletAddress = "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
            .parse()
            .unwrap();
        let mut election = ElectionCore::new(
            format!("Election in {state:?}"),
            "".to_string(),
            VotingMode::SimpleMajority,
            now - Duration::hours(1),
            now + Duration::hours(1),
            admin,
        );
        election.state = state;
        Coll::<ElectionCore>::from_db(db)
            .insert_one(&election, None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into()
    }
}
