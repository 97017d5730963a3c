use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    routing::get,
    Router,
};
use serde_json::json;

use crate::{
    auth::CurrentUser,
    middleware::{auth::require_auth, rate_limit::rate_limit, session::Session},
    response,
    state::AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    // Layers run bottom-up: the auth gate sees the request before the limiter.
    let dashboard = Router::new()
        .route("/dashboard", get(dashboard))
        .route_layer(from_fn_with_state(state, rate_limit))
        .route_layer(from_fn(require_auth));

    let logout = Router::new()
        .route("/logout", get(logout))
        .route_layer(from_fn(require_auth));

    dashboard.merge(logout)
}

async fn dashboard(CurrentUser(user): CurrentUser) -> Response {
    response::ok(
        "Welcome to the dashboard",
        Some(json!({ "user": user })),
    )
}

async fn logout(session: Session) -> Response {
    session.destroy();
    response::ok("Logged out successfully", None)
}
