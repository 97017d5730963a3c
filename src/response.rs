use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{Map, Value};

/// Every JSON body this service emits: `{success, message, ...payload}`.
/// Object payloads are flattened into the top level.
pub fn envelope(
    status: StatusCode,
    success: bool,
    message: impl Into<String>,
    payload: Option<Value>,
) -> Response {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(success));
    body.insert("message".into(), Value::String(message.into()));
    if let Some(Value::Object(extra)) = payload {
        body.extend(extra);
    }

    (status, Json(Value::Object(body))).into_response()
}

pub fn ok(message: impl Into<String>, payload: Option<Value>) -> Response {
    envelope(StatusCode::OK, true, message, payload)
}

pub fn created(message: impl Into<String>, payload: Option<Value>) -> Response {
    envelope(StatusCode::CREATED, true, message, payload)
}
