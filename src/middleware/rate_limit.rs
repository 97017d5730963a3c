use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, middleware::session::Session, state::AppState};

/// Per-session fixed-window limit, for routes that opt in via `route_layer`.
pub async fn rate_limit(
    State(state): State<AppState>,
    session: Session,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    state.limiter.check(&session.id(), state.clock.now()).await?;
    Ok(next.run(req).await)
}
