//! In-memory store doubles for unit tests.
//!
//! `MemStore` implements both [`JobStore`] and [`WorkflowRepository`] over a
//! single mutex-guarded state map, mirroring the SQLite implementation's
//! semantics closely enough to drive worker/engine/reconciler tests without
//! a database.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use conveyor_types::error::QueueError;
use conveyor_types::job::{
    AttemptLogs, AttemptStatus, Job, JobAttempt, JobDefinition, JobStatus, JobWorker, NewJob,
};
use conveyor_types::workflow::{
    RunStatus, StepStatus, WorkflowDefinition, WorkflowRun, WorkflowStepRun,
};
use uuid::Uuid;

use crate::queue::backoff::{NextState, next_state};
use crate::repository::{JobStore, WorkflowRepository};

#[derive(Default)]
struct State {
    definitions: HashMap<String, JobDefinition>,
    jobs: HashMap<Uuid, Job>,
    attempts: Vec<JobAttempt>,
    workers: HashMap<String, JobWorker>,
    workflow_defs: HashMap<String, WorkflowDefinition>,
    runs: HashMap<Uuid, WorkflowRun>,
    step_runs: HashMap<Uuid, WorkflowStepRun>,
}

#[derive(Default)]
pub struct MemStore {
    state: Mutex<State>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition with the given key and defaults suitable for
    /// tests (no schema, 60s timeout, 3 attempts).
    pub async fn seed_definition(&self, key: &str) -> JobDefinition {
        self.seed_definition_with(key, 3).await
    }

    pub async fn seed_definition_with(&self, key: &str, max_attempts: u32) -> JobDefinition {
        let def = JobDefinition {
            id: Uuid::now_v7(),
            key: key.to_string(),
            arg_schema: Default::default(),
            timeout_seconds: 60,
            max_attempts,
            is_active: true,
            created_at: Utc::now(),
        };
        self.create_definition(&def).await.unwrap();
        def
    }

    fn finalize_attempt(
        state: &mut State,
        job_id: Uuid,
        attempt_no: u32,
        status: AttemptStatus,
        exit_code: Option<i32>,
        error: Option<&str>,
        logs: &AttemptLogs,
    ) {
        if let Some(attempt) = state
            .attempts
            .iter_mut()
            .find(|a| a.job_id == job_id && a.attempt_no == attempt_no)
        {
            attempt.status = status;
            attempt.exit_code = exit_code;
            attempt.finished_at = Some(Utc::now());
            attempt.error_text = error.map(String::from);
            attempt.stdout_tail = logs.stdout_tail.clone();
            attempt.stderr_tail = logs.stderr_tail.clone();
        }
    }

    fn held_running_job<'a>(
        state: &'a mut State,
        job_id: Uuid,
        worker_id: &str,
    ) -> Result<&'a mut Job, QueueError> {
        let job = state.jobs.get_mut(&job_id).ok_or(QueueError::NotFound)?;
        if job.status != JobStatus::Running {
            return Err(QueueError::Conflict(format!(
                "job is not running (status {:?})",
                job.status
            )));
        }
        if job.claimed_by_worker.as_deref() != Some(worker_id) {
            return Err(QueueError::Conflict(format!(
                "job held by {:?}, not '{worker_id}'",
                job.claimed_by_worker
            )));
        }
        Ok(job)
    }
}

impl JobStore for MemStore {
    async fn create_definition(&self, def: &JobDefinition) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if state.definitions.contains_key(&def.key) {
            return Err(QueueError::Conflict(format!(
                "definition '{}' already exists",
                def.key
            )));
        }
        state.definitions.insert(def.key.clone(), def.clone());
        Ok(())
    }

    async fn get_definition(&self, key: &str) -> Result<Option<JobDefinition>, QueueError> {
        Ok(self.state.lock().unwrap().definitions.get(key).cloned())
    }

    async fn get_definition_by_id(&self, id: Uuid) -> Result<Option<JobDefinition>, QueueError> {
        let state = self.state.lock().unwrap();
        Ok(state.definitions.values().find(|d| d.id == id).cloned())
    }

    async fn retire_definition(&self, key: &str) -> Result<bool, QueueError> {
        let mut state = self.state.lock().unwrap();
        match state.definitions.get_mut(key) {
            Some(def) => {
                def.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn enqueue(&self, new: NewJob) -> Result<Job, QueueError> {
        let mut state = self.state.lock().unwrap();
        let def = state
            .definitions
            .get(&new.definition_key)
            .filter(|d| d.is_active)
            .ok_or_else(|| {
                QueueError::Validation(format!(
                    "unknown or inactive definition '{}'",
                    new.definition_key
                ))
            })?
            .clone();
        def.arg_schema
            .validate(&new.payload)
            .map_err(QueueError::Validation)?;

        if let Some(key) = &new.dedupe_key {
            let collision = state.jobs.values().any(|j| {
                j.tenant_id == new.tenant_id
                    && j.dedupe_key.as_deref() == Some(key)
                    && matches!(j.status, JobStatus::Queued | JobStatus::Running)
            });
            if collision {
                return Err(QueueError::Conflict(format!(
                    "dedupe key '{key}' already active"
                )));
            }
        }

        let now = Utc::now();
        let job = Job {
            id: Uuid::now_v7(),
            tenant_id: new.tenant_id,
            definition_id: def.id,
            status: JobStatus::Queued,
            priority: new.priority,
            payload: new.payload,
            dedupe_key: new.dedupe_key,
            scheduled_for: new.scheduled_for.unwrap_or(now),
            queued_at: now,
            started_at: None,
            finished_at: None,
            attempt_count: 0,
            max_attempts: new.max_attempts.unwrap_or(def.max_attempts),
            lease_expires_at: None,
            claimed_by_worker: None,
            cancel_requested: false,
            last_error: None,
            source: new.source,
            source_ref: new.source_ref,
        };
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn claim(
        &self,
        worker_id: &str,
        batch_size: u32,
        lease_seconds: u32,
    ) -> Result<Vec<Job>, QueueError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        let mut eligible: Vec<Uuid> = state
            .jobs
            .values()
            .filter(|j| match j.status {
                JobStatus::Queued => j.scheduled_for <= now,
                JobStatus::Running => {
                    j.lease_expires_at.is_some_and(|t| t < now)
                        && j.attempt_count < j.max_attempts
                }
                _ => false,
            })
            .map(|j| j.id)
            .collect();
        eligible.sort_by_key(|id| {
            let j = &state.jobs[id];
            (j.priority, j.queued_at, j.id)
        });
        eligible.truncate(batch_size as usize);

        let mut claimed = Vec::with_capacity(eligible.len());
        for id in eligible {
            let job = state.jobs.get_mut(&id).unwrap();
            job.status = JobStatus::Running;
            job.attempt_count += 1;
            job.lease_expires_at = Some(now + Duration::seconds(lease_seconds as i64));
            job.claimed_by_worker = Some(worker_id.to_string());
            job.started_at.get_or_insert(now);
            let attempt = JobAttempt {
                id: Uuid::now_v7(),
                job_id: id,
                attempt_no: job.attempt_count,
                worker_id: worker_id.to_string(),
                pid: None,
                started_at: now,
                finished_at: None,
                exit_code: None,
                status: AttemptStatus::Running,
                stdout_tail: String::new(),
                stderr_tail: String::new(),
                error_text: None,
            };
            claimed.push(job.clone());
            state.attempts.push(attempt);
        }
        Ok(claimed)
    }

    async fn heartbeat(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_seconds: u32,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        let job = Self::held_running_job(&mut state, job_id, worker_id)?;
        job.lease_expires_at = Some(Utc::now() + Duration::seconds(lease_seconds as i64));
        Ok(())
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        exit_code: i32,
        logs: AttemptLogs,
    ) -> Result<Job, QueueError> {
        let mut state = self.state.lock().unwrap();
        let job = Self::held_running_job(&mut state, job_id, worker_id)?;
        job.status = JobStatus::Succeeded;
        job.finished_at = Some(Utc::now());
        job.lease_expires_at = None;
        job.claimed_by_worker = None;
        let (attempt_no, result) = (job.attempt_count, job.clone());
        Self::finalize_attempt(
            &mut state,
            job_id,
            attempt_no,
            AttemptStatus::Succeeded,
            Some(exit_code),
            None,
            &logs,
        );
        Ok(result)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        attempt_status: AttemptStatus,
        retryable: bool,
        error: &str,
        logs: AttemptLogs,
    ) -> Result<Job, QueueError> {
        let mut state = self.state.lock().unwrap();
        let job = Self::held_running_job(&mut state, job_id, worker_id)?;
        let now = Utc::now();
        match next_state(job.attempt_count, job.max_attempts, retryable) {
            NextState::Requeue(delay) => {
                job.status = JobStatus::Queued;
                job.scheduled_for = now + Duration::from_std(delay).unwrap();
            }
            NextState::DeadLetter => {
                job.status = JobStatus::DeadLetter;
                job.finished_at = Some(now);
            }
        }
        job.lease_expires_at = None;
        job.claimed_by_worker = None;
        job.last_error = Some(error.to_string());
        let (attempt_no, result) = (job.attempt_count, job.clone());
        Self::finalize_attempt(
            &mut state,
            job_id,
            attempt_no,
            attempt_status,
            None,
            Some(error),
            &logs,
        );
        Ok(result)
    }

    async fn cancel(&self, job_id: Uuid, reason: &str) -> Result<Job, QueueError> {
        let mut state = self.state.lock().unwrap();
        let job = state.jobs.get_mut(&job_id).ok_or(QueueError::NotFound)?;
        match job.status {
            JobStatus::Queued => {
                job.status = JobStatus::Canceled;
                job.finished_at = Some(Utc::now());
                job.last_error = Some(reason.to_string());
            }
            JobStatus::Running => {
                job.cancel_requested = true;
                job.last_error = Some(reason.to_string());
            }
            _ => {}
        }
        Ok(job.clone())
    }

    async fn confirm_cancel(
        &self,
        job_id: Uuid,
        worker_id: &str,
        logs: AttemptLogs,
    ) -> Result<Job, QueueError> {
        let mut state = self.state.lock().unwrap();
        let job = Self::held_running_job(&mut state, job_id, worker_id)?;
        job.status = JobStatus::Canceled;
        job.finished_at = Some(Utc::now());
        job.lease_expires_at = None;
        job.claimed_by_worker = None;
        let (attempt_no, result) = (job.attempt_count, job.clone());
        Self::finalize_attempt(
            &mut state,
            job_id,
            attempt_no,
            AttemptStatus::Canceled,
            None,
            None,
            &logs,
        );
        Ok(result)
    }

    async fn expire_exhausted(&self) -> Result<u64, QueueError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let mut moved = 0;
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Running
                && job.lease_expires_at.is_some_and(|t| t < now)
                && job.attempt_count >= job.max_attempts
            {
                job.status = JobStatus::DeadLetter;
                job.finished_at = Some(now);
                job.lease_expires_at = None;
                job.claimed_by_worker = None;
                job.last_error
                    .get_or_insert_with(|| "lease expired with attempts exhausted".to_string());
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, QueueError> {
        Ok(self.state.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn list_jobs(
        &self,
        tenant_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<Job>, QueueError> {
        let state = self.state.lock().unwrap();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn list_attempts(&self, job_id: Uuid) -> Result<Vec<JobAttempt>, QueueError> {
        let state = self.state.lock().unwrap();
        let mut attempts: Vec<JobAttempt> = state
            .attempts
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt_no);
        Ok(attempts)
    }

    async fn update_attempt_logs(
        &self,
        job_id: Uuid,
        attempt_no: u32,
        logs: &AttemptLogs,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if let Some(attempt) = state
            .attempts
            .iter_mut()
            .find(|a| a.job_id == job_id && a.attempt_no == attempt_no)
        {
            attempt.stdout_tail = logs.stdout_tail.clone();
            attempt.stderr_tail = logs.stderr_tail.clone();
        }
        Ok(())
    }

    async fn record_attempt_pid(
        &self,
        job_id: Uuid,
        attempt_no: u32,
        pid: u32,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if let Some(attempt) = state
            .attempts
            .iter_mut()
            .find(|a| a.job_id == job_id && a.attempt_no == attempt_no)
        {
            attempt.pid = Some(pid);
        }
        Ok(())
    }

    async fn upsert_worker(
        &self,
        worker_id: &str,
        running_count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.workers.insert(
            worker_id.to_string(),
            JobWorker {
                worker_id: worker_id.to_string(),
                last_seen_at: now,
                running_count,
            },
        );
        Ok(())
    }
}

impl WorkflowRepository for MemStore {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.workflow_defs.insert(def.key.clone(), def.clone());
        Ok(())
    }

    async fn get_definition(&self, key: &str) -> Result<Option<WorkflowDefinition>, QueueError> {
        Ok(self.state.lock().unwrap().workflow_defs.get(key).cloned())
    }

    async fn create_run(
        &self,
        run: &WorkflowRun,
        steps: &[WorkflowStepRun],
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        state.runs.insert(run.id, run.clone());
        for step in steps {
            state.step_runs.insert(step.id, step.clone());
        }
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, QueueError> {
        Ok(self.state.lock().unwrap().runs.get(&run_id).cloned())
    }

    async fn list_running_runs(&self) -> Result<Vec<WorkflowRun>, QueueError> {
        let state = self.state.lock().unwrap();
        let mut runs: Vec<WorkflowRun> = state
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Running)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        let run = state.runs.get_mut(&run_id).ok_or(QueueError::NotFound)?;
        run.status = status;
        if status.is_terminal() {
            run.finished_at = Some(Utc::now());
        }
        if let Some(e) = error {
            run.error = Some(e.to_string());
        }
        Ok(())
    }

    async fn list_step_runs(&self, run_id: Uuid) -> Result<Vec<WorkflowStepRun>, QueueError> {
        let state = self.state.lock().unwrap();
        let mut steps: Vec<WorkflowStepRun> = state
            .step_runs
            .values()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect();
        steps.sort_by(|a, b| a.step_key.cmp(&b.step_key));
        Ok(steps)
    }

    async fn update_step(
        &self,
        step_run_id: Uuid,
        status: StepStatus,
        child_job_id: Option<Uuid>,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        let step = state
            .step_runs
            .get_mut(&step_run_id)
            .ok_or(QueueError::NotFound)?;
        step.status = status;
        if let Some(id) = child_job_id {
            step.child_job_id = Some(id);
        }
        if let Some(e) = error {
            step.error = Some(e.to_string());
        }
        Ok(())
    }

    async fn find_step_by_child_job(
        &self,
        job_id: Uuid,
    ) -> Result<Option<WorkflowStepRun>, QueueError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .step_runs
            .values()
            .find(|s| s.child_job_id == Some(job_id))
            .cloned())
    }
}
