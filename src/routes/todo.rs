use axum::{
    extract::{rejection::JsonRejection, Path, State},
    middleware::from_fn,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    auth::CurrentUser, error::AppError, middleware::auth::require_auth, response,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/:id", get(get_todo).delete(delete_todo))
        .route("/:id/restore", post(restore_todo))
        .route_layer(from_fn(require_auth))
}

async fn list_todos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let todos = state.todos.list(user.id).await?;
    Ok(response::ok("Todos fetched", Some(json!({ "todos": todos }))))
}

#[derive(Deserialize)]
struct CreateTodoBody {
    todo: Option<String>,
}

async fn create_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CreateTodoBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload?;
    let todo = state
        .todos
        .create(user.id, body.todo.as_deref().unwrap_or_default())
        .await?;
    Ok(response::created("Todo created", Some(json!({ "todo": todo }))))
}

async fn get_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let todo = state.todos.get(user.id, &id).await?;
    Ok(response::ok("Todo fetched", Some(json!({ "todo": todo }))))
}

async fn delete_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let todo = state.todos.soft_delete(user.id, &id).await?;
    info!(todo_id = %todo.id, "todo soft-deleted");
    Ok(response::ok("Todo deleted", Some(json!({ "todo": todo }))))
}

async fn restore_todo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let todo = state.todos.restore(user.id, &id).await?;
    Ok(response::ok("Todo restored", Some(json!({ "todo": todo }))))
}
