//! REST API request handlers.

pub mod job;
pub mod workflow;

use axum::Json;
use serde::Serialize;
use serde_json::{Value, json};

/// Wrap a payload in the `{"data": ...}` envelope used by every endpoint.
pub(crate) fn envelope<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "data": data }))
}
