use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    auth,
    error::AppError,
    middleware::session::Session,
    models::user::UserSnapshot,
    response,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/register", post(register))
        .route("/login", post(login))
}

async fn healthcheck() -> Response {
    response::ok("Server is up and running", None)
}

#[derive(Deserialize)]
struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload?;
    let user = auth::register_user(
        &state,
        body.name.as_deref().unwrap_or_default(),
        body.email.as_deref().unwrap_or_default(),
        body.password.as_deref().unwrap_or_default(),
    )
    .await?;

    Ok(response::created(
        "User registered successfully",
        Some(json!({ "user": UserSnapshot::from(&user) })),
    ))
}

#[derive(Deserialize)]
struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload?;
    let user = auth::authenticate_user(
        &state,
        body.email.as_deref().unwrap_or_default(),
        body.password.as_deref().unwrap_or_default(),
    )
    .await?;

    let snapshot = UserSnapshot::from(&user);
    session.log_in(&snapshot)?;
    info!(user_id = user.id, "user logged in");

    Ok(response::ok(
        "LoggedIn successfully",
        Some(json!({ "user": snapshot })),
    ))
}
