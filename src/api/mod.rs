use rocket::Route;

mod admin;
mod audit;
mod auth;
mod candidate;
mod common;
mod public;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(audit::routes());
    routes.extend(auth::routes());
    routes.extend(candidate::routes());
    routes.extend(public::routes());
    routes.extend(voting::routes());
    routes
}
