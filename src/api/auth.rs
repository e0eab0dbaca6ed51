use std::collections::HashMap;

use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{
            auth::{AdminUser, AuthToken, AUTH_TOKEN_COOKIE},
            SignedMessage, VoterStatus,
        },
        common::ActionKind,
        db::{AuditLogEntry, NewVoter, Settings, Voter},
        mongodb::{errors::is_duplicate_key_error, Coll},
    },
    rate_limit::RateLimiter,
};

use super::common::current_settings;

pub fn routes() -> Vec<Route> {
    routes![register, login, authenticate_admin, logout]
}

/// Register the signing wallet as a voter and sign it in.
#[post("/auth/register", data = "<signed>", format = "json")]
async fn register(
    signed: Json<SignedMessage>,
    new_voters: Coll<NewVoter>,
    settings: Coll<Settings>,
    audit: Coll<AuditLogEntry>,
    limiter: &State<RateLimiter>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<Json<VoterStatus>> {
    let address = signed.0.verify()?;
    if !limiter.check(address.as_str()) {
        return Err(Error::RateLimited);
    }

    let settings = current_settings(&settings).await?;
    if settings.maintenance_mode {
        return Err(Error::BadRequest(
            "The service is under maintenance".to_string(),
        ));
    }
    if !settings.registration_open {
        return Err(Error::BadRequest(
            "Voter registration is currently closed".to_string(),
        ));
    }

    // The unique index on the address decides registration races, not us.
    let voter = NewVoter::new(address.clone());
    match new_voters.insert_one(&voter, None).await {
        Ok(_) => {}
        Err(err) if is_duplicate_key_error(&err) => return Err(Error::AlreadyRegistered),
        Err(err) => return Err(err.into()),
    }

    AuditLogEntry::new(
        ActionKind::VoterRegistered,
        address.clone(),
        doc! { "address": &address },
        None,
    )
    .append(&audit)
    .await?;

    let token = AuthToken::<Voter>::new(address);
    cookies.add(token.into_cookie(config));

    Ok(Json(VoterStatus {
        registered: true,
        verified: true,
        has_voted: HashMap::new(),
    }))
}

/// Sign in an already-registered voter.
#[post("/auth/login", data = "<signed>", format = "json")]
async fn login(
    signed: Json<SignedMessage>,
    voters: Coll<Voter>,
    limiter: &State<RateLimiter>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<Json<VoterStatus>> {
    let address = signed.0.verify()?;
    if !limiter.check(address.as_str()) {
        return Err(Error::RateLimited);
    }

    let voter = voters
        .find_one(doc! { "address": &address }, None)
        .await?
        .ok_or_else(|| Error::unauthorized("Wallet is not registered"))?;

    let token = AuthToken::<Voter>::new(address);
    cookies.add(token.into_cookie(config));

    Ok(Json(VoterStatus::from(&voter)))
}

/// Sign in an administrator. The signer must be on the configured
/// allow-list; a valid signature alone is never enough.
#[post("/auth/admin", data = "<signed>", format = "json")]
async fn authenticate_admin(
    signed: Json<SignedMessage>,
    limiter: &State<RateLimiter>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<()> {
    let address = signed.0.verify()?;
    if !limiter.check(address.as_str()) {
        return Err(Error::RateLimited);
    }

    if !config.is_admin(&address) {
        warn!("Rejected admin sign-in attempt from {address}");
        return Err(Error::unauthorized("Address is not an administrator"));
    }

    let token = AuthToken::<AdminUser>::new(address);
    cookies.add(token.into_cookie(config));

    Ok(())
}

#[post("/auth/logout")]
async fn logout(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json,
    };

    use crate::model::db::voter::VoterCore;

    use super::*;

    #[backend_test]
    async fn register_creates_voter_and_audit_entry(client: Client, db: Database) {
        let key = crate::test_voter_key();
        let signed = SignedMessage::example(&key, "register me");
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&signed).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let status: VoterStatus =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(status.registered);
        assert!(status.has_voted.is_empty());

        // The voter exists with an empty history.
        let address = signed.verify().unwrap();
        let voter = Coll::<Voter>::from_db(&db)
            .find_one(doc! { "address": &address }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(voter.voter, VoterCore::new(address.clone()));

        // The registration was audited.
        let entry = Coll::<AuditLogEntry>::from_db(&db)
            .find_one(doc! { "action": ActionKind::VoterRegistered }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.actor, address);
    }

    #[backend_test]
    async fn duplicate_registration_rejected(client: Client, db: Database) {
        let key = crate::test_voter_key();
        for (attempt, expected) in [(1, Status::Ok), (2, Status::Conflict)] {
            let signed = SignedMessage::example(&key, format!("register attempt {attempt}"));
            let response = client
                .post(uri!(register))
                .header(ContentType::JSON)
                .body(serde_json::to_string(&signed).unwrap())
                .dispatch()
                .await;
            assert_eq!(response.status(), expected);
        }

        // Exactly one voter document exists.
        let count = Coll::<Voter>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[backend_test]
    async fn tampered_signature_rejected(client: Client, db: Database) {
        let key = crate::test_voter_key();
        let mut signed = SignedMessage::example(&key, "register me");
        signed.message = "register someone else".to_string();
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&signed).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let count = Coll::<Voter>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[backend_test]
    async fn login_requires_registration(client: Client) {
        let key = crate::test_voter_key();
        let signed = SignedMessage::example(&key, "let me in");
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&signed).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[backend_test]
    async fn admin_allow_list_enforced(client: Client) {
        // A perfectly valid signature from a non-admin wallet is refused.
        let signed = SignedMessage::example(&crate::test_voter_key(), "admin sign-in");
        let response = client
            .post(uri!(authenticate_admin))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&signed).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        // The allow-listed wallet is accepted.
        let signed = SignedMessage::example(&crate::test_admin_key(), "admin sign-in");
        let response = client
            .post(uri!(authenticate_admin))
            .header(ContentType::JSON)
            .body(serde_json::to_string(&signed).unwrap())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }
}
