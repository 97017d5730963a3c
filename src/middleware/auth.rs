use axum::{extract::Request, middleware::Next, response::Response};
use tracing::debug;

use crate::{error::AppError, middleware::session::Session};

/// Auth gate: only sessions carrying the authenticated marker get through.
/// The user snapshot is handed to handlers via [`crate::auth::CurrentUser`].
pub async fn require_auth(
    session: Session,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(user) = session.authenticated_user() else {
        debug!(path = %req.uri().path(), "rejecting unauthenticated request");
        return Err(AppError::Unauthorized);
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
