//! Event triggers: declarative bindings from named events to job enqueues.
//!
//! A binding maps an event name to a job definition with a payload template
//! rendered from the event context. Window-based dedupe keys collapse event
//! storms: every firing inside the same window produces the same dedupe key,
//! so the store's active-job uniqueness turns the extras into no-ops.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use conveyor_types::error::QueueError;
use conveyor_types::job::{Job, JobSource, NewJob};

use crate::repository::JobStore;
use crate::workflow::payload::render_template;

/// One event-to-job binding.
#[derive(Debug, Clone)]
pub struct TriggerBinding {
    pub id: Uuid,
    /// Event name this binding listens for (e.g. "library.updated").
    pub event: String,
    pub tenant_id: Uuid,
    /// Job definition to enqueue.
    pub definition_key: String,
    /// Payload template; `{{key}}` placeholders are filled from the event
    /// context.
    pub payload_template: Value,
    pub priority: i32,
    /// Dedupe window in seconds; 0 disables deduplication.
    pub dedupe_window_seconds: u32,
    pub active: bool,
}

impl TriggerBinding {
    /// Dedupe key for a firing at `now`: constant within each window so
    /// repeat firings collide on the store's active-job uniqueness.
    pub fn dedupe_key_at(&self, now: DateTime<Utc>) -> Option<String> {
        if self.dedupe_window_seconds == 0 {
            return None;
        }
        let bucket = now
            .timestamp()
            .div_euclid(i64::from(self.dedupe_window_seconds));
        Some(format!("trigger:{}:{bucket}", self.id))
    }
}

/// Resolves incoming events against registered bindings and enqueues the
/// resulting jobs.
pub struct TriggerDispatcher<S> {
    store: Arc<S>,
    bindings: Vec<TriggerBinding>,
}

impl<S: JobStore> TriggerDispatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            bindings: Vec::new(),
        }
    }

    pub fn with_binding(mut self, binding: TriggerBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Fire an event: enqueue one job per matching active binding. A dedupe
    /// collision inside the window is not an error; the colliding binding
    /// simply contributes nothing. Returns the jobs actually enqueued.
    pub async fn fire(
        &self,
        event: &str,
        context: &Map<String, Value>,
    ) -> Result<Vec<Job>, QueueError> {
        let now = Utc::now();
        let mut enqueued = Vec::new();
        for binding in self.bindings.iter().filter(|b| b.active && b.event == event) {
            let payload = render_template(&binding.payload_template, context);
            let new_job = NewJob {
                definition_key: binding.definition_key.clone(),
                tenant_id: binding.tenant_id,
                payload,
                priority: binding.priority,
                scheduled_for: None,
                dedupe_key: binding.dedupe_key_at(now),
                max_attempts: None,
                source: JobSource::Event,
                source_ref: Some(format!("event:{event}")),
            };
            match self.store.enqueue(new_job).await {
                Ok(job) => {
                    info!(%event, trigger_id = %binding.id, job_id = %job.id, "trigger fired");
                    enqueued.push(job);
                }
                Err(QueueError::Conflict(reason)) => {
                    debug!(%event, trigger_id = %binding.id, %reason, "trigger deduplicated");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(enqueued)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
