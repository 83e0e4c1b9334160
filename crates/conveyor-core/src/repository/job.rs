//! Job store trait definition.
//!
//! The job store is the sole source of truth and lock manager for the
//! queue. Every state transition is a single atomic update on the store
//! side; callers coordinate exclusively through it -- there is no direct
//! worker-to-worker communication.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use chrono::{DateTime, Utc};
use conveyor_types::error::QueueError;
use conveyor_types::job::{
    AttemptLogs, AttemptStatus, Job, JobAttempt, JobDefinition, JobStatus, NewJob,
};
use uuid::Uuid;

/// Persistence and lease protocol for the job queue.
///
/// Claim semantics are the only correctness-critical synchronization point
/// in the system: an implementation must guarantee that each job is handed
/// to at most one claimant, even under arbitrary concurrent `claim` calls,
/// and must never block a claimant waiting for eligible rows.
pub trait JobStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions (admin surface)
    // -----------------------------------------------------------------------

    /// Register an allowlisted job definition. Fails `Conflict` on a
    /// duplicate key.
    fn create_definition(
        &self,
        def: &JobDefinition,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Look up a definition by key.
    fn get_definition(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<JobDefinition>, QueueError>> + Send;

    /// Look up a definition by id. Workers resolve claimed jobs through
    /// this to recover the command key and timeout.
    fn get_definition_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<JobDefinition>, QueueError>> + Send;

    /// Retire a definition so new jobs can no longer reference it.
    /// Returns `false` if the key does not exist.
    fn retire_definition(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<bool, QueueError>> + Send;

    // -----------------------------------------------------------------------
    // Enqueue
    // -----------------------------------------------------------------------

    /// Validate and insert a new job as `queued`.
    ///
    /// Fails `Validation` when the definition is unknown or inactive, or the
    /// payload violates its `ArgSchema`; fails `Conflict` when `dedupe_key`
    /// collides with a queued/running job of the same tenant.
    fn enqueue(&self, new: NewJob) -> impl Future<Output = Result<Job, QueueError>> + Send;

    // -----------------------------------------------------------------------
    // Lease protocol
    // -----------------------------------------------------------------------

    /// Atomically claim up to `batch_size` eligible jobs for `worker_id`.
    ///
    /// Eligible: `queued` with `scheduled_for <= now`, plus `running` jobs
    /// whose lease expired with attempts remaining (stale-lease
    /// reclamation). Ordered by `(priority, queued_at, id)`. Each claimed
    /// job transitions to `running` with a fresh lease, an incremented
    /// `attempt_count` and a new `running` attempt row. Returns an empty
    /// vec -- never blocks -- when nothing is eligible.
    fn claim(
        &self,
        worker_id: &str,
        batch_size: u32,
        lease_seconds: u32,
    ) -> impl Future<Output = Result<Vec<Job>, QueueError>> + Send;

    /// Extend the lease on a running job. Fails `Conflict` (with zero
    /// mutation) if the job is not running or is held by a different worker.
    fn heartbeat(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_seconds: u32,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Terminal success: clears lease/claim, finalizes the attempt row.
    fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        exit_code: i32,
        logs: AttemptLogs,
    ) -> impl Future<Output = Result<Job, QueueError>> + Send;

    /// Record a failed attempt. Retryable failures with attempts remaining
    /// requeue with a backoff delay; everything else dead-letters.
    fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        attempt_status: AttemptStatus,
        retryable: bool,
        error: &str,
        logs: AttemptLogs,
    ) -> impl Future<Output = Result<Job, QueueError>> + Send;

    /// Request cancellation. Non-running jobs become `canceled` immediately;
    /// for running jobs only the intent is recorded -- the owning worker
    /// kills the subprocess on its next cancellation poll. Terminal jobs are
    /// returned unchanged.
    fn cancel(
        &self,
        job_id: Uuid,
        reason: &str,
    ) -> impl Future<Output = Result<Job, QueueError>> + Send;

    /// Finalize a running job whose subprocess was killed after a
    /// cancellation request. Holder-checked like `complete`/`fail`.
    fn confirm_cancel(
        &self,
        job_id: Uuid,
        worker_id: &str,
        logs: AttemptLogs,
    ) -> impl Future<Output = Result<Job, QueueError>> + Send;

    /// Dead-letter running jobs whose lease expired with no attempts left.
    /// Returns the number of jobs moved. Invoked by the reconciler.
    fn expire_exhausted(&self) -> impl Future<Output = Result<u64, QueueError>> + Send;

    // -----------------------------------------------------------------------
    // Queries and observability
    // -----------------------------------------------------------------------

    fn get_job(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<Job>, QueueError>> + Send;

    /// List a tenant's jobs, optionally filtered by status, newest first.
    fn list_jobs(
        &self,
        tenant_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Job>, QueueError>> + Send;

    fn list_attempts(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Vec<JobAttempt>, QueueError>> + Send;

    /// Overwrite the live output tails of an in-flight attempt.
    fn update_attempt_logs(
        &self,
        job_id: Uuid,
        attempt_no: u32,
        logs: &AttemptLogs,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Record the subprocess pid on an in-flight attempt.
    fn record_attempt_pid(
        &self,
        job_id: Uuid,
        attempt_no: u32,
        pid: u32,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Upsert the worker heartbeat row. Observability only.
    fn upsert_worker(
        &self,
        worker_id: &str,
        running_count: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}
