//! Workflow-related CLI commands: run, show, cancel.

use conveyor_core::repository::WorkflowRepository;
use uuid::Uuid;

use crate::state::AppState;

pub async fn run(
    state: &AppState,
    workflow_key: &str,
    tenant: Uuid,
    payload: &str,
    priority: i32,
    json: bool,
) -> anyhow::Result<()> {
    let payload: serde_json::Value = serde_json::from_str(payload)?;
    let run = state.engine.start(workflow_key, tenant, payload, priority).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("started run {} of '{}'", run.id, run.workflow_key);
    }
    Ok(())
}

/// Print a workflow run with its steps, if `id` names a run.
/// Returns false when no such run exists so the caller can try other kinds.
pub async fn show(state: &AppState, id: Uuid, json: bool) -> anyhow::Result<bool> {
    let Some(run) = state.repo.get_run(id).await? else {
        return Ok(false);
    };
    let steps = state.repo.list_step_runs(id).await?;

    if json {
        let detail = serde_json::json!({ "run": run, "steps": steps });
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        println!("run {} of '{}' [{:?}]", run.id, run.workflow_key, run.status);
        if let Some(error) = &run.error {
            println!("  error: {error}");
        }
        for step in &steps {
            let child = step
                .child_job_id
                .map(|id| format!(" job={id}"))
                .unwrap_or_default();
            println!("  step {} [{:?}]{child}", step.step_key, step.status);
        }
    }
    Ok(true)
}

/// Cancel a workflow run, if `id` names one. Returns false when not found.
pub async fn cancel(state: &AppState, id: Uuid, reason: &str, json: bool) -> anyhow::Result<bool> {
    if state.repo.get_run(id).await?.is_none() {
        return Ok(false);
    }
    let run = state.engine.cancel_run(id, reason).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("run {} is now {:?}", run.id, run.status);
    }
    Ok(true)
}
