//! Workflow domain types.
//!
//! A `WorkflowDefinition` is a DAG of steps, each backed by a job definition.
//! Executing a workflow creates a `WorkflowRun` owning one `WorkflowStepRun`
//! per step; each step run is driven to completion through a child job in the
//! queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow definition
// ---------------------------------------------------------------------------

/// A DAG of steps executed together as one run. Validated acyclic with
/// resolvable dependencies at create/update time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// UUIDv7 assigned on first save.
    pub id: Uuid,
    /// Stable identifier (e.g. "photos.full-reindex").
    pub key: String,
    pub steps: Vec<WorkflowStep>,
    /// Upper bound on concurrently running steps per run.
    pub max_parallel_steps: u32,
    pub failure_policy: FailurePolicy,
    pub created_at: DateTime<Utc>,
}

/// A single step in the workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow.
    pub step_key: String,
    /// The job definition backing this step.
    pub definition_key: String,
    /// Step keys this step waits on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Deep-merged over the run payload to form the child job payload;
    /// template keys win on conflict.
    #[serde(default = "empty_object")]
    pub payload_template: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// What happens to the rest of the run when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Cancel everything in flight, skip everything pending.
    FailFast,
    /// Skip only the failed step's transitive dependents; independent
    /// branches keep advancing.
    Continue,
}

// ---------------------------------------------------------------------------
// Workflow run
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// One execution of a workflow definition for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    /// Denormalized definition key for display and child-job source refs.
    pub workflow_key: String,
    pub status: RunStatus,
    /// Run-level payload shared by all steps.
    pub payload: serde_json::Value,
    /// Priority handed to every child job.
    pub priority: i32,
    pub max_parallel_steps: u32,
    pub failure_policy: FailurePolicy,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow step run
// ---------------------------------------------------------------------------

/// Status of an individual step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Canceled | StepStatus::Skipped
        )
    }

    /// Queued or running: counts against `max_parallel_steps`.
    pub fn is_in_flight(self) -> bool {
        matches!(self, StepStatus::Queued | StepStatus::Running)
    }
}

/// Execution state of one step within one run; `step_key` unique per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepRun {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_key: String,
    pub definition_key: String,
    pub status: StepStatus,
    pub depends_on: Vec<String>,
    /// The queue job executing this step, set when the step is started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_job_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
