//! Workflow endpoints: definition admin, run start/inspect/cancel.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use conveyor_core::repository::WorkflowRepository;
use conveyor_types::error::WorkflowError;
use conveyor_types::workflow::{FailurePolicy, WorkflowStep};

use crate::http::error::AppError;
use crate::http::handlers::envelope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub key: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default = "default_parallelism")]
    pub max_parallel_steps: u32,
    #[serde(default = "default_policy")]
    pub failure_policy: FailurePolicy,
}

fn default_parallelism() -> u32 {
    1
}

fn default_policy() -> FailurePolicy {
    FailurePolicy::FailFast
}

/// POST /api/v1/workflow-definitions - Validate and save a workflow DAG.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let def = state
        .engine
        .create_definition(
            body.key,
            body.steps,
            body.max_parallel_steps,
            body.failure_policy,
        )
        .await?;
    Ok((StatusCode::CREATED, envelope(def)))
}

/// GET /api/v1/workflow-definitions/{key}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let def = state
        .repo
        .get_definition(&key)
        .await
        .map_err(WorkflowError::from)?
        .ok_or(AppError::Workflow(WorkflowError::UnknownWorkflow(key)))?;
    Ok(envelope(def))
}

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub workflow_key: String,
    pub tenant_id: Uuid,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    100
}

/// POST /api/v1/workflow-runs - Start a run and kick off its first wave.
pub async fn start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let run = state
        .engine
        .start(&body.workflow_key, body.tenant_id, body.payload, body.priority)
        .await?;
    tracing::info!(run_id = %run.id, workflow_key = %run.workflow_key, "workflow run started via API");
    Ok((StatusCode::CREATED, envelope(run)))
}

/// GET /api/v1/workflow-runs/{id} - Run with its step runs.
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let run = state
        .repo
        .get_run(id)
        .await
        .map_err(WorkflowError::from)?
        .ok_or(AppError::Workflow(WorkflowError::RunNotFound))?;
    let steps = state
        .repo
        .list_step_runs(id)
        .await
        .map_err(WorkflowError::from)?;
    Ok(envelope(serde_json::json!({
        "run": run,
        "steps": steps,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelRunRequest {
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "canceled via API".to_string()
}

/// POST /api/v1/workflow-runs/{id}/cancel - Cancel a run: in-flight child
/// jobs get cancellation requests, pending steps are skipped.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRunRequest>>,
) -> Result<Json<Value>, AppError> {
    let reason = body
        .map(|Json(b)| b.reason)
        .unwrap_or_else(default_reason);
    let run = state.engine.cancel_run(id, &reason).await?;
    Ok(envelope(run))
}
