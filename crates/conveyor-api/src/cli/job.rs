//! Job-related CLI commands: enqueue, show, cancel.

use chrono::{Duration, Utc};
use conveyor_core::repository::JobStore;
use conveyor_types::job::{JobSource, NewJob};
use uuid::Uuid;

use crate::state::AppState;

#[allow(clippy::too_many_arguments)]
pub async fn enqueue(
    state: &AppState,
    definition_key: String,
    tenant: Uuid,
    payload: &str,
    priority: i32,
    dedupe_key: Option<String>,
    delay_secs: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let payload: serde_json::Value = serde_json::from_str(payload)?;
    let job = state
        .store
        .enqueue(NewJob {
            definition_key,
            tenant_id: tenant,
            payload,
            priority,
            scheduled_for: delay_secs.map(|d| Utc::now() + Duration::seconds(i64::from(d))),
            dedupe_key,
            max_attempts: None,
            source: JobSource::Manual,
            source_ref: None,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        println!("enqueued {} (status {:?}, priority {})", job.id, job.status, job.priority);
    }
    Ok(())
}

/// Print a job with its attempts, if `id` names a job.
/// Returns false when no such job exists so the caller can try other kinds.
pub async fn show(state: &AppState, id: Uuid, json: bool) -> anyhow::Result<bool> {
    let Some(job) = state.store.get_job(id).await? else {
        return Ok(false);
    };
    let attempts = state.store.list_attempts(id).await?;

    if json {
        let detail = serde_json::json!({ "job": job, "attempts": attempts });
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        println!("job {} [{:?}]", job.id, job.status);
        println!("  definition: {}", job.definition_id);
        println!("  tenant:     {}", job.tenant_id);
        println!("  attempts:   {}/{}", job.attempt_count, job.max_attempts);
        if let Some(error) = &job.last_error {
            println!("  last error: {error}");
        }
        for attempt in &attempts {
            println!(
                "  attempt {} [{:?}] worker={} exit={:?}",
                attempt.attempt_no, attempt.status, attempt.worker_id, attempt.exit_code
            );
        }
    }
    Ok(true)
}

/// Cancel a job, if `id` names one. Returns false when not found.
pub async fn cancel(state: &AppState, id: Uuid, reason: &str, json: bool) -> anyhow::Result<bool> {
    match state.store.get_job(id).await? {
        None => Ok(false),
        Some(_) => {
            let job = state.store.cancel(id, reason).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else if job.cancel_requested && job.status == conveyor_types::job::JobStatus::Running
            {
                println!("cancellation requested for running job {}", job.id);
            } else {
                println!("job {} is now {:?}", job.id, job.status);
            }
            Ok(true)
        }
    }
}
