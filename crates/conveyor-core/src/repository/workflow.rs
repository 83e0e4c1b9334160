//! Workflow repository trait definition.
//!
//! Storage interface for workflow definitions, runs and step runs. The
//! engine drives all status transitions through this trait; the
//! infrastructure layer implements it with SQLite.

use conveyor_types::error::QueueError;
use conveyor_types::workflow::{
    RunStatus, StepStatus, WorkflowDefinition, WorkflowRun, WorkflowStepRun,
};
use uuid::Uuid;

/// Repository for workflow persistence.
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Upsert a workflow definition (insert or replace by key).
    fn save_definition(
        &self,
        def: &WorkflowDefinition,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    fn get_definition(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<WorkflowDefinition>, QueueError>> + Send;

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a run together with its initial step runs.
    fn create_run(
        &self,
        run: &WorkflowRun,
        steps: &[WorkflowStepRun],
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    fn get_run(
        &self,
        run_id: Uuid,
    ) -> impl Future<Output = Result<Option<WorkflowRun>, QueueError>> + Send;

    /// All runs currently `running`, oldest first. Reconciler input.
    fn list_running_runs(
        &self,
    ) -> impl Future<Output = Result<Vec<WorkflowRun>, QueueError>> + Send;

    fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    // -----------------------------------------------------------------------
    // Step runs
    // -----------------------------------------------------------------------

    fn list_step_runs(
        &self,
        run_id: Uuid,
    ) -> impl Future<Output = Result<Vec<WorkflowStepRun>, QueueError>> + Send;

    /// Update a step's status and, optionally, its child job and error.
    /// `child_job_id` and `error` are only written when `Some`.
    fn update_step(
        &self,
        step_run_id: Uuid,
        status: StepStatus,
        child_job_id: Option<Uuid>,
        error: Option<&str>,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Find the step run whose child job is `job_id`, if any. Used by the
    /// event-driven path to map a job transition back to its step.
    fn find_step_by_child_job(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<WorkflowStepRun>, QueueError>> + Send;
}
