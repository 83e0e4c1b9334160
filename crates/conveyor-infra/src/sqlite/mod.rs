//! SQLite-backed persistence.

pub mod job;
pub mod pool;
pub mod workflow;

use chrono::{DateTime, Utc};
use conveyor_types::error::QueueError;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Shared row helpers
// ---------------------------------------------------------------------------

pub(crate) fn storage(e: impl std::fmt::Display) -> QueueError {
    QueueError::Storage(e.to_string())
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, QueueError> {
    s.parse::<Uuid>()
        .map_err(|e| QueueError::Storage(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::Storage(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Serialize a unit-variant serde enum to its snake_case wire string.
pub(crate) fn enum_str<T: serde::Serialize>(value: &T) -> Result<String, QueueError> {
    match serde_json::to_value(value).map_err(storage)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(QueueError::Storage(format!(
            "expected string-serializable enum, got {other}"
        ))),
    }
}

/// Parse a snake_case wire string back into a serde enum.
pub(crate) fn enum_from_str<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, QueueError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| QueueError::Storage(format!("invalid enum value: {s}")))
}
