//! Workflow engine: definition validation, run lifecycle, and the advance
//! sweep.
//!
//! `advance` is level-triggered and idempotent: it derives every transition
//! from current store state (mirror child jobs, propagate failures, start
//! ready steps within the parallelism budget, finalize). Both the
//! event-driven path (a child job reaching a terminal state) and the
//! periodic reconciler call the same function, so a missed event is
//! repaired by the next sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conveyor_types::error::{QueueError, WorkflowError};
use conveyor_types::job::{Job, JobSource, JobStatus, NewJob};
use conveyor_types::workflow::{
    FailurePolicy, RunStatus, StepStatus, WorkflowDefinition, WorkflowRun, WorkflowStep,
    WorkflowStepRun,
};

use crate::queue::worker::TerminalHook;
use crate::repository::{JobStore, WorkflowRepository};
use crate::workflow::dag;
use crate::workflow::payload::effective_step_payload;

/// What one advance sweep did to a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// Whether any step or run state was written.
    pub changed: bool,
    /// Steps whose child jobs were enqueued this sweep.
    pub steps_started: usize,
}

pub struct WorkflowEngine<S, R> {
    store: Arc<S>,
    repo: Arc<R>,
}

impl<S, R> WorkflowEngine<S, R>
where
    S: JobStore,
    R: WorkflowRepository,
{
    pub fn new(store: Arc<S>, repo: Arc<R>) -> Self {
        Self { store, repo }
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Validate and save a workflow definition. The DAG must be acyclic with
    /// resolvable dependencies, and every step must reference an active job
    /// definition.
    pub async fn create_definition(
        &self,
        key: impl Into<String>,
        steps: Vec<WorkflowStep>,
        max_parallel_steps: u32,
        failure_policy: FailurePolicy,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        if max_parallel_steps == 0 {
            return Err(QueueError::Validation(
                "max_parallel_steps must be at least 1".to_string(),
            )
            .into());
        }
        dag::validate(&steps)?;
        for step in &steps {
            let known = self
                .store
                .get_definition(&step.definition_key)
                .await?
                .is_some_and(|d| d.is_active);
            if !known {
                return Err(WorkflowError::UnknownDefinition {
                    step: step.step_key.clone(),
                    definition: step.definition_key.clone(),
                });
            }
        }

        let def = WorkflowDefinition {
            id: Uuid::now_v7(),
            key: key.into(),
            steps,
            max_parallel_steps,
            failure_policy,
            created_at: Utc::now(),
        };
        self.repo.save_definition(&def).await?;
        info!(workflow_key = %def.key, steps = def.steps.len(), "workflow definition saved");
        Ok(def)
    }

    // -----------------------------------------------------------------------
    // Run lifecycle
    // -----------------------------------------------------------------------

    /// Create a run for `workflow_key` and kick off its first wave of steps.
    pub async fn start(
        &self,
        workflow_key: &str,
        tenant_id: Uuid,
        payload: Value,
        priority: i32,
    ) -> Result<WorkflowRun, WorkflowError> {
        let def = self
            .repo
            .get_definition(workflow_key)
            .await?
            .ok_or_else(|| WorkflowError::UnknownWorkflow(workflow_key.to_string()))?;

        let run = WorkflowRun {
            id: Uuid::now_v7(),
            tenant_id,
            workflow_id: def.id,
            workflow_key: def.key.clone(),
            status: RunStatus::Running,
            payload,
            priority,
            max_parallel_steps: def.max_parallel_steps,
            failure_policy: def.failure_policy,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        let steps: Vec<WorkflowStepRun> = def
            .steps
            .iter()
            .map(|step| WorkflowStepRun {
                id: Uuid::now_v7(),
                run_id: run.id,
                step_key: step.step_key.clone(),
                definition_key: step.definition_key.clone(),
                status: StepStatus::Pending,
                depends_on: step.depends_on.clone(),
                child_job_id: None,
                error: None,
            })
            .collect();

        self.repo.create_run(&run, &steps).await?;
        info!(run_id = %run.id, workflow_key = %run.workflow_key, "workflow run started");
        self.advance(run.id).await?;
        self.repo
            .get_run(run.id)
            .await?
            .ok_or(WorkflowError::RunNotFound)
    }

    /// Cancel a run: pending steps are skipped, in-flight child jobs get a
    /// cancellation request, and the run lands in `canceled` immediately.
    /// Terminal runs are returned unchanged.
    pub async fn cancel_run(
        &self,
        run_id: Uuid,
        reason: &str,
    ) -> Result<WorkflowRun, WorkflowError> {
        let run = self
            .repo
            .get_run(run_id)
            .await?
            .ok_or(WorkflowError::RunNotFound)?;
        if run.status.is_terminal() {
            return Ok(run);
        }

        let steps = self.repo.list_step_runs(run_id).await?;
        for step in &steps {
            match step.status {
                StepStatus::Pending => {
                    self.repo
                        .update_step(step.id, StepStatus::Skipped, None, None)
                        .await?;
                }
                StepStatus::Queued | StepStatus::Running => {
                    if let Some(job_id) = step.child_job_id {
                        self.store.cancel(job_id, reason).await?;
                    }
                    self.repo
                        .update_step(step.id, StepStatus::Canceled, None, Some(reason))
                        .await?;
                }
                _ => {}
            }
        }

        self.repo
            .update_run_status(run_id, RunStatus::Canceled, Some(reason))
            .await?;
        info!(%run_id, %reason, "workflow run canceled");
        self.repo
            .get_run(run_id)
            .await?
            .ok_or(WorkflowError::RunNotFound)
    }

    // -----------------------------------------------------------------------
    // Advance sweep
    // -----------------------------------------------------------------------

    /// Drive a run forward from current store state. Safe to call at any
    /// time and from both the event path and the reconciler; a sweep over an
    /// already-settled run writes nothing.
    pub async fn advance(&self, run_id: Uuid) -> Result<AdvanceOutcome, WorkflowError> {
        let run = self
            .repo
            .get_run(run_id)
            .await?
            .ok_or(WorkflowError::RunNotFound)?;
        if run.status.is_terminal() {
            return Ok(AdvanceOutcome::default());
        }
        let def = self
            .repo
            .get_definition(&run.workflow_key)
            .await?
            .ok_or_else(|| WorkflowError::UnknownWorkflow(run.workflow_key.clone()))?;
        let mut steps = self.repo.list_step_runs(run_id).await?;
        let mut outcome = AdvanceOutcome::default();

        self.mirror_child_jobs(&mut steps, &mut outcome).await?;
        self.propagate_failures(&run, &mut steps, &mut outcome)
            .await?;
        self.start_ready_steps(&run, &def, &mut steps, &mut outcome)
            .await?;
        self.finalize(&run, &steps, &mut outcome).await?;

        Ok(outcome)
    }

    /// Map each non-terminal step's child job status onto the step.
    async fn mirror_child_jobs(
        &self,
        steps: &mut [WorkflowStepRun],
        outcome: &mut AdvanceOutcome,
    ) -> Result<(), WorkflowError> {
        for step in steps.iter_mut() {
            if step.status.is_terminal() {
                continue;
            }
            let Some(job_id) = step.child_job_id else {
                continue;
            };
            let Some(job) = self.store.get_job(job_id).await? else {
                continue;
            };
            let mirrored = match job.status {
                JobStatus::Queued => StepStatus::Queued,
                JobStatus::Running => StepStatus::Running,
                JobStatus::Succeeded => StepStatus::Succeeded,
                JobStatus::Canceled => StepStatus::Canceled,
                JobStatus::DeadLetter => StepStatus::Failed,
            };
            if mirrored != step.status {
                let error = match mirrored {
                    StepStatus::Failed | StepStatus::Canceled => job.last_error.as_deref(),
                    _ => None,
                };
                self.repo
                    .update_step(step.id, mirrored, None, error)
                    .await?;
                step.status = mirrored;
                if let Some(e) = error {
                    step.error = Some(e.to_string());
                }
                outcome.changed = true;
            }
        }
        Ok(())
    }

    /// Apply the run's failure policy once any step has failed or been
    /// canceled.
    async fn propagate_failures(
        &self,
        run: &WorkflowRun,
        steps: &mut [WorkflowStepRun],
        outcome: &mut AdvanceOutcome,
    ) -> Result<(), WorkflowError> {
        let blocked: Vec<String> = steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed | StepStatus::Canceled))
            .map(|s| s.step_key.clone())
            .collect();
        if blocked.is_empty() {
            return Ok(());
        }

        match run.failure_policy {
            FailurePolicy::FailFast => {
                for i in 0..steps.len() {
                    match steps[i].status {
                        StepStatus::Pending => {
                            self.repo
                                .update_step(steps[i].id, StepStatus::Skipped, None, None)
                                .await?;
                            steps[i].status = StepStatus::Skipped;
                            outcome.changed = true;
                        }
                        StepStatus::Queued | StepStatus::Running => {
                            let Some(job_id) = steps[i].child_job_id else {
                                continue;
                            };
                            let job = self.store.cancel(job_id, "workflow failed fast").await?;
                            // A queued child cancels synchronously; a running
                            // one is only flagged and mirrors on a later sweep.
                            if job.status == JobStatus::Canceled {
                                self.repo
                                    .update_step(
                                        steps[i].id,
                                        StepStatus::Canceled,
                                        None,
                                        job.last_error.as_deref(),
                                    )
                                    .await?;
                                steps[i].status = StepStatus::Canceled;
                                outcome.changed = true;
                            }
                        }
                        _ => {}
                    }
                }
            }
            FailurePolicy::Continue => {
                let roots: HashSet<&str> = blocked.iter().map(String::as_str).collect();
                let pairs: Vec<(&str, &[String])> = steps
                    .iter()
                    .map(|s| (s.step_key.as_str(), s.depends_on.as_slice()))
                    .collect();
                let dependents = dag::transitive_dependents(&roots, pairs);
                for i in 0..steps.len() {
                    if steps[i].status == StepStatus::Pending
                        && dependents.contains(&steps[i].step_key)
                    {
                        self.repo
                            .update_step(steps[i].id, StepStatus::Skipped, None, None)
                            .await?;
                        steps[i].status = StepStatus::Skipped;
                        outcome.changed = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Enqueue child jobs for pending steps whose dependencies are satisfied,
    /// up to the run's parallelism budget.
    async fn start_ready_steps(
        &self,
        run: &WorkflowRun,
        def: &WorkflowDefinition,
        steps: &mut [WorkflowStepRun],
        outcome: &mut AdvanceOutcome,
    ) -> Result<(), WorkflowError> {
        let in_flight = steps.iter().filter(|s| s.status.is_in_flight()).count() as u32;
        let mut budget = run.max_parallel_steps.saturating_sub(in_flight);
        if budget == 0 {
            return Ok(());
        }

        let ready: Vec<usize> = {
            let settled = |dep: &str| {
                steps.iter().any(|s| {
                    s.step_key == dep
                        && (s.status == StepStatus::Succeeded
                            || (s.status == StepStatus::Skipped
                                && run.failure_policy == FailurePolicy::Continue))
                })
            };
            steps
                .iter()
                .enumerate()
                .filter(|(_, s)| s.status == StepStatus::Pending)
                .filter(|(_, s)| s.depends_on.iter().all(|dep| settled(dep)))
                .map(|(i, _)| i)
                .collect()
        };

        for i in ready {
            if budget == 0 {
                break;
            }
            let template = def
                .steps
                .iter()
                .find(|t| t.step_key == steps[i].step_key)
                .map(|t| t.payload_template.clone())
                .unwrap_or_else(|| Value::Object(Default::default()));
            let payload = effective_step_payload(&run.payload, &template);
            let new_job = NewJob {
                definition_key: steps[i].definition_key.clone(),
                tenant_id: run.tenant_id,
                payload,
                priority: run.priority,
                scheduled_for: None,
                dedupe_key: None,
                max_attempts: None,
                source: JobSource::System,
                source_ref: Some(format!("workflow_run:{}:{}", run.id, steps[i].step_key)),
            };
            match self.store.enqueue(new_job).await {
                Ok(job) => {
                    self.repo
                        .update_step(steps[i].id, StepStatus::Queued, Some(job.id), None)
                        .await?;
                    debug!(run_id = %run.id, step_key = %steps[i].step_key, job_id = %job.id, "step started");
                    steps[i].status = StepStatus::Queued;
                    budget -= 1;
                    outcome.steps_started += 1;
                    outcome.changed = true;
                }
                Err(QueueError::Validation(msg)) | Err(QueueError::Conflict(msg)) => {
                    // The step can never start; record the failure and let
                    // the failure policy deal with it on the next pass.
                    warn!(run_id = %run.id, step_key = %steps[i].step_key, error = %msg, "step rejected at enqueue");
                    self.repo
                        .update_step(steps[i].id, StepStatus::Failed, None, Some(&msg))
                        .await?;
                    steps[i].status = StepStatus::Failed;
                    outcome.changed = true;
                }
                Err(other) => return Err(other.into()),
            }
        }
        Ok(())
    }

    /// Settle the run once every step is terminal.
    async fn finalize(
        &self,
        run: &WorkflowRun,
        steps: &[WorkflowStepRun],
        outcome: &mut AdvanceOutcome,
    ) -> Result<(), WorkflowError> {
        if !steps.iter().all(|s| s.status.is_terminal()) {
            return Ok(());
        }
        let status = if steps.iter().any(|s| s.status == StepStatus::Failed) {
            RunStatus::Failed
        } else if steps.iter().any(|s| s.status == StepStatus::Canceled) {
            RunStatus::Canceled
        } else {
            RunStatus::Succeeded
        };
        let error = steps
            .iter()
            .find(|s| s.status == StepStatus::Failed)
            .map(|s| match &s.error {
                Some(cause) => format!("step '{}' failed: {cause}", s.step_key),
                None => format!("step '{}' failed", s.step_key),
            });
        self.repo
            .update_run_status(run.id, status, error.as_deref())
            .await?;
        info!(run_id = %run.id, ?status, "workflow run settled");
        outcome.changed = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event path
    // -----------------------------------------------------------------------

    /// Advance the run owning `job_id`, if any. Jobs outside workflows are
    /// ignored.
    pub async fn on_job_terminal(
        &self,
        job_id: Uuid,
    ) -> Result<Option<AdvanceOutcome>, WorkflowError> {
        let Some(step) = self.repo.find_step_by_child_job(job_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.advance(step.run_id).await?))
    }
}

impl<S, R> WorkflowEngine<S, R>
where
    S: JobStore + 'static,
    R: WorkflowRepository + 'static,
{
    /// Adapter for the worker's terminal hook: advance the owning run when a
    /// child job settles. Errors are logged; the reconciler repairs anything
    /// the event path misses.
    pub fn terminal_hook(self: &Arc<Self>) -> TerminalHook {
        let engine = Arc::clone(self);
        Arc::new(move |job: Job| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                if let Err(error) = engine.on_job_terminal(job.id).await {
                    warn!(job_id = %job.id, %error, "workflow advance after job settled failed");
                }
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
