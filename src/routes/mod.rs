pub mod public;
pub mod todo;
pub mod user;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::{middleware::session::session_layer, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .merge(user::router(state.clone()))
        .nest("/todo", todo::router())
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
