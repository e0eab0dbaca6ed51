use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    options::FindOptions,
};
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{AdminUser, AuthToken},
            AuditAppendRequest, AuditEntryView,
        },
        common::{ActionKind, WalletAddress},
        db::AuditLogEntry,
        mongodb::Coll,
        Paginated, Pagination,
    },
};

pub fn routes() -> Vec<Route> {
    routes![query_audit, export_audit, append_audit]
}

/// Query the audit trail, newest first. All filters are optional and
/// combine conjunctively; results are paginated and restartable.
///
/// Filters are parsed by hand rather than through `Option` form guards: a
/// mistyped filter must be a rejection, not a silent full-log result.
#[get("/audit?<kind>&<actor>&<from>&<to>")]
async fn query_audit(
    kind: Option<String>,
    actor: Option<String>,
    from: Option<String>,
    to: Option<String>,
    pagination: Pagination,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<Paginated<AuditEntryView>>> {
    let filter = build_filter(
        kind.as_deref(),
        actor.as_deref(),
        from.as_deref(),
        to.as_deref(),
    )?;
    let total = audit.count_documents(filter.clone(), None).await?;
    let options = FindOptions::builder()
        .sort(newest_first())
        .skip(pagination.skip())
        .limit(pagination.limit())
        .build();
    let entries: Vec<AuditLogEntry> = audit.find(filter, options).await?.try_collect().await?;
    Ok(Json(Paginated {
        items: entries.into_iter().map(Into::into).collect(),
        pagination: pagination.meta(total),
    }))
}

/// Export the full matched set in one stable serialization.
#[get("/audit/export?<kind>&<actor>&<from>&<to>")]
async fn export_audit(
    _token: AuthToken<AdminUser>,
    kind: Option<String>,
    actor: Option<String>,
    from: Option<String>,
    to: Option<String>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<Vec<AuditEntryView>>> {
    let filter = build_filter(
        kind.as_deref(),
        actor.as_deref(),
        from.as_deref(),
        to.as_deref(),
    )?;
    let options = FindOptions::builder().sort(newest_first()).build();
    let entries: Vec<AuditLogEntry> = audit.find(filter, options).await?.try_collect().await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Append a free-form entry. The actor is the authenticated administrator.
#[post("/audit", data = "<request>", format = "json")]
async fn append_audit(
    token: AuthToken<AdminUser>,
    request: Json<AuditAppendRequest>,
    audit: Coll<AuditLogEntry>,
) -> Result<Json<AuditEntryView>> {
    let payload = match Bson::try_from(request.0.payload) {
        Ok(Bson::Document(payload)) => payload,
        _ => {
            return Err(Error::BadRequest(
                "Audit payload must be a JSON object".to_string(),
            ))
        }
    };
    let entry = AuditLogEntry::new(request.0.action, token.address, payload, None)
        .append(&audit)
        .await?;
    Ok(Json(entry.into()))
}

fn newest_first() -> Document {
    doc! { "timestamp": -1, "_id": 1 }
}

fn build_filter(
    kind: Option<&str>,
    actor: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Document> {
    let mut filter = doc! {};
    if let Some(kind) = kind {
        let kind: ActionKind = kind
            .parse()
            .map_err(|_| Error::BadRequest(format!("Unknown action kind: {kind}")))?;
        filter.insert("action", kind);
    }
    if let Some(actor) = actor {
        let actor: WalletAddress = actor
            .parse()
            .map_err(|_| Error::BadRequest(format!("Invalid actor address: {actor}")))?;
        filter.insert("actor", &actor);
    }
    let mut range = doc! {};
    if let Some(from) = from {
        range.insert("$gte", BsonDateTime::from_chrono(parse_instant(from)?));
    }
    if let Some(to) = to {
        range.insert("$lte", BsonDateTime::from_chrono(parse_instant(to)?));
    }
    if !range.is_empty() {
        filter.insert("timestamp", range);
    }
    Ok(filter)
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|_| Error::BadRequest(format!("Invalid RFC 3339 timestamp: {value}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use mongodb::Database;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::{self, json},
    };

    use super::*;

    fn address(suffix: u8) -> WalletAddress {
        format!("0x00000000000000000000000000000000000000{suffix:02x}")
            .parse()
            .unwrap()
    }

    async fn seed(db: &Database, kind: ActionKind, actor: WalletAddress, note: &str) {
        AuditLogEntry::new(kind, actor, doc! { "note": note }, None)
            .append(&Coll::from_db(db))
            .await
            .unwrap();
    }

    #[backend_test]
    async fn filters_combine(client: Client, db: Database) {
        seed(&db, ActionKind::VoteCast, address(1), "a").await;
        seed(&db, ActionKind::ElectionStarted, address(1), "b").await;
        seed(&db, ActionKind::VoteCast, address(2), "c").await;

        assert_eq!(query(&client, "/audit?kind=VOTE_CAST").await.items.len(), 2);
        assert_eq!(
            query(&client, &format!("/audit?actor={}", address(1)))
                .await
                .items
                .len(),
            2
        );
        let page = query(
            &client,
            &format!("/audit?kind=VOTE_CAST&actor={}", address(1)),
        )
        .await;
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.pagination.total, 1);

        // An unknown kind is a bad request, not an empty (or full!) result.
        let response = client.get("/audit?kind=VOTE_DELETED").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        let response = client.get("/audit?actor=not-an-address").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[backend_test]
    async fn time_window_filters(client: Client, db: Database) {
        seed(&db, ActionKind::VoteCast, address(1), "now").await;

        // 'Z'-suffixed so the timestamp survives query string decoding.
        let hour_ago = (Utc::now() - chrono::Duration::hours(1))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let in_window = query(&client, &format!("/audit?from={hour_ago}")).await;
        assert_eq!(in_window.items.len(), 1);

        let before_window = query(&client, &format!("/audit?to={hour_ago}")).await;
        assert!(before_window.items.is_empty());

        let response = client.get("/audit?from=yesterday").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[backend_test]
    async fn pagination_is_restartable(client: Client, db: Database) {
        for i in 0..5 {
            seed(&db, ActionKind::VoteCast, address(1), &format!("entry {i}")).await;
        }

        let mut seen = HashSet::new();
        let mut last_timestamp: Option<DateTime<Utc>> = None;
        for (page_num, expected) in [(1, 2), (2, 2), (3, 1)] {
            let page = query(
                &client,
                &format!("/audit?page_num={page_num}&page_size=2"),
            )
            .await;
            assert_eq!(page.items.len(), expected);
            assert_eq!(page.pagination.total, 5);
            for item in page.items {
                // Newest first, across page boundaries.
                if let Some(last) = last_timestamp {
                    assert!(item.timestamp <= last);
                }
                last_timestamp = Some(item.timestamp);
                assert!(seen.insert(item.entry_hash), "duplicate across pages");
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[backend_test(admin)]
    async fn append_records_the_admin_as_actor(client: Client, db: Database) {
        let body = json!({
            "action": "SETTINGS_UPDATED",
            "payload": { "note": "manual intervention" },
        });
        let response = client
            .post(uri!(append_audit))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let view: AuditEntryView =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        let admin = WalletAddress::from_public_key(&crate::test_admin_key().verifying_key());
        assert_eq!(view.actor, admin);

        let stored = Coll::<AuditLogEntry>::from_db(&db)
            .find_one(doc! { "_id": view.entry_hash.as_str() }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payload.get_str("note").unwrap(), "manual intervention");

        // Non-object payloads are refused.
        let body = json!({ "action": "SETTINGS_UPDATED", "payload": 42 });
        let response = client
            .post(uri!(append_audit))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[backend_test(admin)]
    async fn exported_hashes_recompute(client: Client, db: Database) {
        seed(&db, ActionKind::VoteCast, address(1), "verify me").await;
        seed(&db, ActionKind::ElectionStopped, address(2), "me too").await;

        let response = client.get("/audit/export").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let views: Vec<AuditEntryView> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(views.len(), 2);

        // The content hash survives the DB and export round trip, which is
        // exactly what the verification CLI relies on.
        for view in views {
            let payload = match Bson::try_from(view.payload).unwrap() {
                Bson::Document(payload) => payload,
                other => panic!("payload exported as {other:?}"),
            };
            let recomputed = AuditLogEntry::content_hash(
                view.action,
                &view.actor,
                &payload,
                view.timestamp,
            );
            assert_eq!(recomputed, view.entry_hash);
        }
    }

    async fn query(client: &Client, uri: &str) -> Paginated<AuditEntryView> {
        let response = client.get(uri.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: serde_json::Value =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        Paginated {
            items: serde_json::from_value(body["items"].clone()).unwrap(),
            pagination: serde_json::from_value(body["pagination"].clone()).unwrap(),
        }
    }
}
