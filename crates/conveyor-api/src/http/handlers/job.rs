//! Job endpoints: enqueue, inspect, cancel, plus definition admin.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use conveyor_core::repository::JobStore;
use conveyor_types::job::{ArgSchema, JobDefinition, NewJob};

use crate::http::error::AppError;
use crate::http::handlers::envelope;
use crate::state::AppState;

/// POST /api/v1/jobs - Enqueue a job.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(new): Json<NewJob>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let job = state.store.enqueue(new).await?;
    tracing::info!(job_id = %job.id, tenant_id = %job.tenant_id, "job enqueued via API");
    Ok((StatusCode::CREATED, envelope(job)))
}

/// GET /api/v1/jobs/{id} - Job with its attempt history.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let job = state
        .store
        .get_job(id)
        .await?
        .ok_or(AppError::Queue(conveyor_types::error::QueueError::NotFound))?;
    let attempts = state.store.list_attempts(id).await?;
    Ok(envelope(serde_json::json!({
        "job": job,
        "attempts": attempts,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "canceled via API".to_string()
}

/// POST /api/v1/jobs/{id}/cancel - Request cancellation.
///
/// Queued jobs land in `canceled` immediately; running jobs only record the
/// intent, which the holding worker honors on its next cancel poll.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Value>, AppError> {
    let reason = body
        .map(|Json(b)| b.reason)
        .unwrap_or_else(default_reason);
    let job = state.store.cancel(id, &reason).await?;
    Ok(envelope(job))
}

// ---------------------------------------------------------------------------
// Definition admin
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateDefinitionRequest {
    pub key: String,
    #[serde(default)]
    pub arg_schema: ArgSchema,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_timeout() -> u32 {
    3600
}

fn default_max_attempts() -> u32 {
    3
}

/// POST /api/v1/job-definitions - Register an allowlisted definition.
pub async fn create_definition(
    State(state): State<AppState>,
    Json(body): Json<CreateDefinitionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let def = JobDefinition {
        id: Uuid::now_v7(),
        key: body.key,
        arg_schema: body.arg_schema,
        timeout_seconds: body.timeout_seconds,
        max_attempts: body.max_attempts,
        is_active: true,
        created_at: Utc::now(),
    };
    state.store.create_definition(&def).await?;
    Ok((StatusCode::CREATED, envelope(def)))
}

/// POST /api/v1/job-definitions/{key}/retire - Stop accepting new jobs for a
/// definition. Existing jobs keep running.
pub async fn retire_definition(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let retired = state.store.retire_definition(&key).await?;
    if !retired {
        return Err(AppError::Queue(conveyor_types::error::QueueError::NotFound));
    }
    Ok(envelope(serde_json::json!({ "key": key, "is_active": false })))
}
