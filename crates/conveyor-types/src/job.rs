//! Job queue domain types.
//!
//! A `JobDefinition` is an allowlisted command template: an administrator
//! registers the key, the argument schema, the timeout and the retry budget.
//! A `Job` is one queued execution of a definition for one tenant. Every
//! execution attempt gets its own append-only `JobAttempt` row carrying the
//! captured output tails.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Argument schema
// ---------------------------------------------------------------------------

/// Declared payload contract for a job definition.
///
/// Payloads are JSON objects; each field is typed and either required or
/// optional. Keys not present in the schema are rejected, so a definition's
/// argv builder never sees arguments it did not declare.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgSchema {
    #[serde(default)]
    pub fields: BTreeMap<String, ArgField>,
}

/// A single field in an [`ArgSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgField {
    #[serde(rename = "type")]
    pub kind: ArgKind,
    #[serde(default)]
    pub required: bool,
}

/// JSON type expected for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ArgKind {
    fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            ArgKind::String => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Number => value.is_number(),
            ArgKind::Boolean => value.is_boolean(),
            ArgKind::Object => value.is_object(),
            ArgKind::Array => value.is_array(),
        }
    }
}

impl ArgSchema {
    /// Validate a payload against this schema.
    ///
    /// Returns a human-readable description of the first violation found:
    /// non-object payload, missing required field, unknown field, or type
    /// mismatch. `null` is accepted for optional fields.
    pub fn validate(&self, payload: &serde_json::Value) -> Result<(), String> {
        let map = payload
            .as_object()
            .ok_or_else(|| "payload must be a JSON object".to_string())?;

        for (name, field) in &self.fields {
            match map.get(name) {
                Some(value) => {
                    if value.is_null() && !field.required {
                        continue;
                    }
                    if !field.kind.matches(value) {
                        return Err(format!(
                            "field '{name}' has wrong type (expected {:?})",
                            field.kind
                        ));
                    }
                }
                None if field.required => {
                    return Err(format!("missing required field '{name}'"));
                }
                None => {}
            }
        }

        for key in map.keys() {
            if !self.fields.contains_key(key) {
                return Err(format!("unknown field '{key}'"));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job definition
// ---------------------------------------------------------------------------

/// An allowlisted command template. Immutable once referenced by a job;
/// retired by flipping `is_active` off rather than deleting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    /// Allowlist identifier (e.g. "photos.sync-library").
    pub key: String,
    /// Declared payload contract, enforced at enqueue time.
    pub arg_schema: ArgSchema,
    /// Subprocess wall-clock budget; exceeded runs are killed.
    pub timeout_seconds: u32,
    /// Default retry budget for jobs of this definition.
    pub max_attempts: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
///
/// A retryable failure requeues the job (`Queued` again with a backoff
/// delay) rather than introducing a distinct `failed` state; exhausted or
/// non-retryable failures land in `DeadLetter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Canceled,
    DeadLetter,
}

impl JobStatus {
    /// Terminal states are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Canceled | JobStatus::DeadLetter
        )
    }
}

/// How a job entered the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Manual,
    Event,
    Schedule,
    System,
}

/// One queued execution of an allowlisted command for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub definition_id: Uuid,
    pub status: JobStatus,
    /// Lower values are claimed first.
    pub priority: i32,
    pub payload: serde_json::Value,
    /// Unique among queued/running jobs of the tenant while present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    /// Earliest claim time; backoff requeues push this into the future.
    pub scheduled_for: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    /// Non-null iff `status == Running`. Expiry makes the job reclaimable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by_worker: Option<String>,
    /// Cancellation intent for a running job; the owning worker observes
    /// this flag and kills the subprocess.
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub source: JobSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

/// Enqueue request. `max_attempts` falls back to the definition default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub definition_key: String,
    pub tenant_id: Uuid,
    pub payload: serde_json::Value,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_source")]
    pub source: JobSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

fn default_priority() -> i32 {
    100
}

fn default_source() -> JobSource {
    JobSource::Manual
}

// ---------------------------------------------------------------------------
// Job attempt
// ---------------------------------------------------------------------------

/// Outcome of a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Running,
    Succeeded,
    Failed,
    Timeout,
    Canceled,
}

/// Append-only record of one execution attempt, `(job_id, attempt_no)`
/// unique. Output tails are bounded and flushed periodically while the
/// subprocess runs, so they double as live progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttempt {
    pub id: Uuid,
    pub job_id: Uuid,
    /// 1-based; matches the job's `attempt_count` at claim time.
    pub attempt_no: u32,
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub status: AttemptStatus,
    pub stdout_tail: String,
    pub stderr_tail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

/// Captured output tails handed to the store on completion/failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptLogs {
    pub stdout_tail: String,
    pub stderr_tail: String,
}

// ---------------------------------------------------------------------------
// Worker heartbeat
// ---------------------------------------------------------------------------

/// Operational heartbeat row per worker process. Observability only; the
/// correctness path rests entirely on job leases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWorker {
    pub worker_id: String,
    pub last_seen_at: DateTime<Utc>,
    pub running_count: u32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
