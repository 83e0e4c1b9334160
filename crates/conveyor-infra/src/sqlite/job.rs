//! SQLite job store implementation.
//!
//! Implements `JobStore` from `conveyor-core` using sqlx with split
//! read/write pools. Every lifecycle transition is one transaction on the
//! single-connection writer pool, which serializes concurrent claimants:
//! the claim UPDATE picks eligible rows and flips them to `running` in one
//! statement, so a job can never be handed to two workers.

use chrono::{Duration, Utc};
use conveyor_core::queue::{NextState, next_state};
use conveyor_core::repository::JobStore;
use conveyor_types::error::QueueError;
use conveyor_types::job::{
    AttemptLogs, AttemptStatus, Job, JobAttempt, JobDefinition, JobStatus, NewJob,
};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{enum_from_str, enum_str, format_datetime, parse_datetime, parse_uuid, storage};

/// SQLite-backed implementation of `JobStore`.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: DatabasePool,
}

impl SqliteJobStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

const JOB_COLUMNS: &str = "id, tenant_id, definition_id, status, priority, payload, dedupe_key, \
     scheduled_for, queued_at, started_at, finished_at, attempt_count, max_attempts, \
     lease_expires_at, claimed_by_worker, cancel_requested, last_error, source, source_ref";

struct JobRow {
    id: String,
    tenant_id: String,
    definition_id: String,
    status: String,
    priority: i64,
    payload: String,
    dedupe_key: Option<String>,
    scheduled_for: String,
    queued_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    attempt_count: i64,
    max_attempts: i64,
    lease_expires_at: Option<String>,
    claimed_by_worker: Option<String>,
    cancel_requested: i64,
    last_error: Option<String>,
    source: String,
    source_ref: Option<String>,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            definition_id: row.try_get("definition_id")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            payload: row.try_get("payload")?,
            dedupe_key: row.try_get("dedupe_key")?,
            scheduled_for: row.try_get("scheduled_for")?,
            queued_at: row.try_get("queued_at")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            attempt_count: row.try_get("attempt_count")?,
            max_attempts: row.try_get("max_attempts")?,
            lease_expires_at: row.try_get("lease_expires_at")?,
            claimed_by_worker: row.try_get("claimed_by_worker")?,
            cancel_requested: row.try_get("cancel_requested")?,
            last_error: row.try_get("last_error")?,
            source: row.try_get("source")?,
            source_ref: row.try_get("source_ref")?,
        })
    }

    fn into_job(self) -> Result<Job, QueueError> {
        Ok(Job {
            id: parse_uuid(&self.id)?,
            tenant_id: parse_uuid(&self.tenant_id)?,
            definition_id: parse_uuid(&self.definition_id)?,
            status: enum_from_str(&self.status)?,
            priority: self.priority as i32,
            payload: serde_json::from_str(&self.payload)
                .map_err(|e| QueueError::Storage(format!("invalid payload JSON: {e}")))?,
            dedupe_key: self.dedupe_key,
            scheduled_for: parse_datetime(&self.scheduled_for)?,
            queued_at: parse_datetime(&self.queued_at)?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_datetime).transpose()?,
            attempt_count: self.attempt_count as u32,
            max_attempts: self.max_attempts as u32,
            lease_expires_at: self
                .lease_expires_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            claimed_by_worker: self.claimed_by_worker,
            cancel_requested: self.cancel_requested != 0,
            last_error: self.last_error,
            source: enum_from_str(&self.source)?,
            source_ref: self.source_ref,
        })
    }
}

struct AttemptRow {
    id: String,
    job_id: String,
    attempt_no: i64,
    worker_id: String,
    pid: Option<i64>,
    started_at: String,
    finished_at: Option<String>,
    exit_code: Option<i64>,
    status: String,
    stdout_tail: String,
    stderr_tail: String,
    error_text: Option<String>,
}

impl AttemptRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            attempt_no: row.try_get("attempt_no")?,
            worker_id: row.try_get("worker_id")?,
            pid: row.try_get("pid")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            exit_code: row.try_get("exit_code")?,
            status: row.try_get("status")?,
            stdout_tail: row.try_get("stdout_tail")?,
            stderr_tail: row.try_get("stderr_tail")?,
            error_text: row.try_get("error_text")?,
        })
    }

    fn into_attempt(self) -> Result<JobAttempt, QueueError> {
        Ok(JobAttempt {
            id: parse_uuid(&self.id)?,
            job_id: parse_uuid(&self.job_id)?,
            attempt_no: self.attempt_no as u32,
            worker_id: self.worker_id,
            pid: self.pid.map(|p| p as u32),
            started_at: parse_datetime(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(parse_datetime).transpose()?,
            exit_code: self.exit_code.map(|c| c as i32),
            status: enum_from_str(&self.status)?,
            stdout_tail: self.stdout_tail,
            stderr_tail: self.stderr_tail,
            error_text: self.error_text,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn map_unique_violation(e: sqlx::Error, conflict: impl FnOnce() -> String) -> QueueError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => QueueError::Conflict(conflict()),
        _ => storage(e),
    }
}

type SqliteTx<'a> = sqlx::Transaction<'a, sqlx::Sqlite>;

/// Fetch a job inside a transaction and verify the caller holds its lease.
async fn fetch_held(
    tx: &mut SqliteTx<'_>,
    job_id: Uuid,
    worker_id: &str,
) -> Result<Job, QueueError> {
    let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
    let row = sqlx::query(&query)
        .bind(job_id.to_string())
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage)?;
    let job = row
        .ok_or(QueueError::NotFound)
        .and_then(|r| JobRow::from_row(&r).map_err(storage))
        .and_then(JobRow::into_job)?;
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

async fn finalize_attempt(
    tx: &mut SqliteTx<'_>,
    job_id: Uuid,
    attempt_no: u32,
    status: AttemptStatus,
    exit_code: Option<i32>,
    error: Option<&str>,
    logs: &AttemptLogs,
) -> Result<(), QueueError> {
    sqlx::query(
        "UPDATE job_attempts
         SET status = ?, exit_code = ?, finished_at = ?, error_text = ?,
             stdout_tail = ?, stderr_tail = ?
         WHERE job_id = ? AND attempt_no = ?",
    )
    .bind(enum_str(&status)?)
    .bind(exit_code)
    .bind(format_datetime(&Utc::now()))
    .bind(error)
    .bind(&logs.stdout_tail)
    .bind(&logs.stderr_tail)
    .bind(job_id.to_string())
    .bind(attempt_no as i64)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JobStore impl
// ---------------------------------------------------------------------------

impl JobStore for SqliteJobStore {
    async fn create_definition(&self, def: &JobDefinition) -> Result<(), QueueError> {
        let schema_json = serde_json::to_string(&def.arg_schema).map_err(storage)?;
        sqlx::query(
            "INSERT INTO job_definitions
             (id, key, arg_schema, timeout_seconds, max_attempts, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(def.id.to_string())
        .bind(&def.key)
        .bind(&schema_json)
        .bind(def.timeout_seconds as i64)
        .bind(def.max_attempts as i64)
        .bind(def.is_active as i64)
        .bind(format_datetime(&def.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            map_unique_violation(e, || format!("definition '{}' already exists", def.key))
        })?;
        Ok(())
    }

    async fn get_definition(&self, key: &str) -> Result<Option<JobDefinition>, QueueError> {
        let row = sqlx::query(
            "SELECT id, key, arg_schema, timeout_seconds, max_attempts, is_active, created_at
             FROM job_definitions WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(storage)?;
        row.map(|r| definition_from_row(&r)).transpose()
    }

    async fn get_definition_by_id(&self, id: Uuid) -> Result<Option<JobDefinition>, QueueError> {
        let row = sqlx::query(
            "SELECT id, key, arg_schema, timeout_seconds, max_attempts, is_active, created_at
             FROM job_definitions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(storage)?;
        row.map(|r| definition_from_row(&r)).transpose()
    }

    async fn retire_definition(&self, key: &str) -> Result<bool, QueueError> {
        let result = sqlx::query("UPDATE job_definitions SET is_active = 0 WHERE key = ?")
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn enqueue(&self, new: NewJob) -> Result<Job, QueueError> {
        let def = self
            .get_definition(&new.definition_key)
            .await?
            .filter(|d| d.is_active)
            .ok_or_else(|| {
                QueueError::Validation(format!(
                    "unknown or inactive definition '{}'",
                    new.definition_key
                ))
            })?;
        def.arg_schema
            .validate(&new.payload)
            .map_err(QueueError::Validation)?;

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
        let payload_json = serde_json::to_string(&job.payload).map_err(storage)?;

        // The partial unique index on (tenant_id, dedupe_key) over active
        // jobs turns a dedupe race into a constraint violation here.
        sqlx::query(
            "INSERT INTO jobs
             (id, tenant_id, definition_id, status, priority, payload, dedupe_key,
              scheduled_for, queued_at, attempt_count, max_attempts, cancel_requested,
              source, source_ref)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 0, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(job.tenant_id.to_string())
        .bind(job.definition_id.to_string())
        .bind(enum_str(&job.status)?)
        .bind(job.priority as i64)
        .bind(&payload_json)
        .bind(&job.dedupe_key)
        .bind(format_datetime(&job.scheduled_for))
        .bind(format_datetime(&job.queued_at))
        .bind(job.max_attempts as i64)
        .bind(enum_str(&job.source)?)
        .bind(&job.source_ref)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            let key = job.dedupe_key.clone().unwrap_or_default();
            map_unique_violation(e, || format!("dedupe key '{key}' already active"))
        })?;
        Ok(job)
    }

    async fn claim(
        &self,
        worker_id: &str,
        batch_size: u32,
        lease_seconds: u32,
    ) -> Result<Vec<Job>, QueueError> {
        let now = Utc::now();
        let now_str = format_datetime(&now);
        let lease_str = format_datetime(&(now + Duration::seconds(i64::from(lease_seconds))));

        let mut tx = self.pool.writer.begin().await.map_err(storage)?;

        // One statement selects and flips the winners; the single writer
        // connection serializes competing claimants.
        let query = format!(
            "UPDATE jobs SET
                 status = 'running',
                 attempt_count = attempt_count + 1,
                 lease_expires_at = ?,
                 claimed_by_worker = ?,
                 started_at = COALESCE(started_at, ?)
             WHERE id IN (
                 SELECT id FROM jobs
                 WHERE (status = 'queued' AND scheduled_for <= ?)
                    OR (status = 'running' AND lease_expires_at < ? AND attempt_count < max_attempts)
                 ORDER BY priority ASC, queued_at ASC, id ASC
                 LIMIT ?
             )
             RETURNING {JOB_COLUMNS}"
        );
        let rows = sqlx::query(&query)
            .bind(&lease_str)
            .bind(worker_id)
            .bind(&now_str)
            .bind(&now_str)
            .bind(&now_str)
            .bind(batch_size as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(storage)?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in &rows {
            let job = JobRow::from_row(row).map_err(storage)?.into_job()?;
            // A stale-lease reclaim leaves the superseded attempt stuck in
            // 'running'; close it out before recording the new one.
            sqlx::query(
                "UPDATE job_attempts
                 SET status = 'timeout', finished_at = ?, error_text = ?
                 WHERE job_id = ? AND status = 'running'",
            )
            .bind(&now_str)
            .bind("lease expired; attempt superseded by reclaim")
            .bind(job.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
            sqlx::query(
                "INSERT INTO job_attempts (id, job_id, attempt_no, worker_id, started_at, status)
                 VALUES (?, ?, ?, ?, ?, 'running')",
            )
            .bind(Uuid::now_v7().to_string())
            .bind(job.id.to_string())
            .bind(job.attempt_count as i64)
            .bind(worker_id)
            .bind(&now_str)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
            claimed.push(job);
        }

        tx.commit().await.map_err(storage)?;
        Ok(claimed)
    }

    async fn heartbeat(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_seconds: u32,
    ) -> Result<(), QueueError> {
        let lease_str =
            format_datetime(&(Utc::now() + Duration::seconds(i64::from(lease_seconds))));
        let result = sqlx::query(
            "UPDATE jobs SET lease_expires_at = ?
             WHERE id = ? AND status = 'running' AND claimed_by_worker = ?",
        )
        .bind(&lease_str)
        .bind(job_id.to_string())
        .bind(worker_id)
        .execute(&self.pool.writer)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            // Nothing was touched; report why.
            return match self.get_job(job_id).await? {
                None => Err(QueueError::NotFound),
                Some(job) => Err(QueueError::Conflict(format!(
                    "job is {:?}, held by {:?}",
                    job.status, job.claimed_by_worker
                ))),
            };
        }
        Ok(())
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        exit_code: i32,
        logs: AttemptLogs,
    ) -> Result<Job, QueueError> {
        let mut tx = self.pool.writer.begin().await.map_err(storage)?;
        let mut job = fetch_held(&mut tx, job_id, worker_id).await?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE jobs SET status = 'succeeded', finished_at = ?,
                 lease_expires_at = NULL, claimed_by_worker = NULL
             WHERE id = ?",
        )
        .bind(format_datetime(&now))
        .bind(job_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        finalize_attempt(
            &mut tx,
            job_id,
            job.attempt_count,
            AttemptStatus::Succeeded,
            Some(exit_code),
            None,
            &logs,
        )
        .await?;
        tx.commit().await.map_err(storage)?;

        job.status = JobStatus::Succeeded;
        job.finished_at = Some(now);
        job.lease_expires_at = None;
        job.claimed_by_worker = None;
        Ok(job)
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
        let mut tx = self.pool.writer.begin().await.map_err(storage)?;
        let mut job = fetch_held(&mut tx, job_id, worker_id).await?;

        let now = Utc::now();
        match next_state(job.attempt_count, job.max_attempts, retryable) {
            NextState::Requeue(delay) => {
                let resume = now + Duration::from_std(delay).map_err(storage)?;
                sqlx::query(
                    "UPDATE jobs SET status = 'queued', scheduled_for = ?,
                         lease_expires_at = NULL, claimed_by_worker = NULL, last_error = ?
                     WHERE id = ?",
                )
                .bind(format_datetime(&resume))
                .bind(error)
                .bind(job_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
                job.status = JobStatus::Queued;
                job.scheduled_for = resume;
            }
            NextState::DeadLetter => {
                sqlx::query(
                    "UPDATE jobs SET status = 'dead_letter', finished_at = ?,
                         lease_expires_at = NULL, claimed_by_worker = NULL, last_error = ?
                     WHERE id = ?",
                )
                .bind(format_datetime(&now))
                .bind(error)
                .bind(job_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
                job.status = JobStatus::DeadLetter;
                job.finished_at = Some(now);
            }
        }
        finalize_attempt(
            &mut tx,
            job_id,
            job.attempt_count,
            attempt_status,
            None,
            Some(error),
            &logs,
        )
        .await?;
        tx.commit().await.map_err(storage)?;

        job.lease_expires_at = None;
        job.claimed_by_worker = None;
        job.last_error = Some(error.to_string());
        Ok(job)
    }

    async fn cancel(&self, job_id: Uuid, reason: &str) -> Result<Job, QueueError> {
        let mut tx = self.pool.writer.begin().await.map_err(storage)?;
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(job_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
        let mut job = row
            .ok_or(QueueError::NotFound)
            .and_then(|r| JobRow::from_row(&r).map_err(storage))
            .and_then(JobRow::into_job)?;

        match job.status {
            JobStatus::Queued => {
                let now = Utc::now();
                sqlx::query(
                    "UPDATE jobs SET status = 'canceled', finished_at = ?, last_error = ?
                     WHERE id = ?",
                )
                .bind(format_datetime(&now))
                .bind(reason)
                .bind(job_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
                job.status = JobStatus::Canceled;
                job.finished_at = Some(now);
                job.last_error = Some(reason.to_string());
            }
            JobStatus::Running => {
                sqlx::query("UPDATE jobs SET cancel_requested = 1, last_error = ? WHERE id = ?")
                    .bind(reason)
                    .bind(job_id.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(storage)?;
                job.cancel_requested = true;
                job.last_error = Some(reason.to_string());
            }
            // Terminal jobs are returned unchanged.
            _ => {}
        }
        tx.commit().await.map_err(storage)?;
        Ok(job)
    }

    async fn confirm_cancel(
        &self,
        job_id: Uuid,
        worker_id: &str,
        logs: AttemptLogs,
    ) -> Result<Job, QueueError> {
        let mut tx = self.pool.writer.begin().await.map_err(storage)?;
        let mut job = fetch_held(&mut tx, job_id, worker_id).await?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE jobs SET status = 'canceled', finished_at = ?,
                 lease_expires_at = NULL, claimed_by_worker = NULL
             WHERE id = ?",
        )
        .bind(format_datetime(&now))
        .bind(job_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        finalize_attempt(
            &mut tx,
            job_id,
            job.attempt_count,
            AttemptStatus::Canceled,
            None,
            None,
            &logs,
        )
        .await?;
        tx.commit().await.map_err(storage)?;

        job.status = JobStatus::Canceled;
        job.finished_at = Some(now);
        job.lease_expires_at = None;
        job.claimed_by_worker = None;
        Ok(job)
    }

    async fn expire_exhausted(&self) -> Result<u64, QueueError> {
        let now_str = format_datetime(&Utc::now());
        let result = sqlx::query(
            "UPDATE jobs SET status = 'dead_letter', finished_at = ?,
                 lease_expires_at = NULL, claimed_by_worker = NULL,
                 last_error = COALESCE(last_error, 'lease expired with attempts exhausted')
             WHERE status = 'running' AND lease_expires_at < ? AND attempt_count >= max_attempts",
        )
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool.writer)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, QueueError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(job_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(storage)?;
        row.map(|r| JobRow::from_row(&r).map_err(storage)?.into_job())
            .transpose()
    }

    async fn list_jobs(
        &self,
        tenant_id: Uuid,
        status: Option<JobStatus>,
        limit: u32,
    ) -> Result<Vec<Job>, QueueError> {
        let rows = match status {
            Some(status) => {
                let query = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE tenant_id = ? AND status = ?
                     ORDER BY queued_at DESC LIMIT ?"
                );
                sqlx::query(&query)
                    .bind(tenant_id.to_string())
                    .bind(enum_str(&status)?)
                    .bind(limit as i64)
                    .fetch_all(&self.pool.reader)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE tenant_id = ?
                     ORDER BY queued_at DESC LIMIT ?"
                );
                sqlx::query(&query)
                    .bind(tenant_id.to_string())
                    .bind(limit as i64)
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(storage)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            jobs.push(JobRow::from_row(row).map_err(storage)?.into_job()?);
        }
        Ok(jobs)
    }

    async fn list_attempts(&self, job_id: Uuid) -> Result<Vec<JobAttempt>, QueueError> {
        let rows = sqlx::query(
            "SELECT id, job_id, attempt_no, worker_id, pid, started_at, finished_at,
                    exit_code, status, stdout_tail, stderr_tail, error_text
             FROM job_attempts WHERE job_id = ? ORDER BY attempt_no ASC",
        )
        .bind(job_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(storage)?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in &rows {
            attempts.push(AttemptRow::from_row(row).map_err(storage)?.into_attempt()?);
        }
        Ok(attempts)
    }

    async fn update_attempt_logs(
        &self,
        job_id: Uuid,
        attempt_no: u32,
        logs: &AttemptLogs,
    ) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE job_attempts SET stdout_tail = ?, stderr_tail = ?
             WHERE job_id = ? AND attempt_no = ?",
        )
        .bind(&logs.stdout_tail)
        .bind(&logs.stderr_tail)
        .bind(job_id.to_string())
        .bind(attempt_no as i64)
        .execute(&self.pool.writer)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn record_attempt_pid(
        &self,
        job_id: Uuid,
        attempt_no: u32,
        pid: u32,
    ) -> Result<(), QueueError> {
        sqlx::query("UPDATE job_attempts SET pid = ? WHERE job_id = ? AND attempt_no = ?")
            .bind(pid as i64)
            .bind(job_id.to_string())
            .bind(attempt_no as i64)
            .execute(&self.pool.writer)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn upsert_worker(
        &self,
        worker_id: &str,
        running_count: u32,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO job_workers (worker_id, last_seen_at, running_count)
             VALUES (?, ?, ?)
             ON CONFLICT(worker_id) DO UPDATE SET
               last_seen_at = excluded.last_seen_at,
               running_count = excluded.running_count",
        )
        .bind(worker_id)
        .bind(format_datetime(&now))
        .bind(running_count as i64)
        .execute(&self.pool.writer)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

fn definition_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<JobDefinition, QueueError> {
    let id: String = row.try_get("id").map_err(storage)?;
    let key: String = row.try_get("key").map_err(storage)?;
    let arg_schema: String = row.try_get("arg_schema").map_err(storage)?;
    let timeout_seconds: i64 = row.try_get("timeout_seconds").map_err(storage)?;
    let max_attempts: i64 = row.try_get("max_attempts").map_err(storage)?;
    let is_active: i64 = row.try_get("is_active").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;
    Ok(JobDefinition {
        id: parse_uuid(&id)?,
        key,
        arg_schema: serde_json::from_str(&arg_schema)
            .map_err(|e| QueueError::Storage(format!("invalid arg_schema JSON: {e}")))?,
        timeout_seconds: timeout_seconds as u32,
        max_attempts: max_attempts as u32,
        is_active: is_active != 0,
        created_at: parse_datetime(&created_at)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_types::job::JobSource;
    use serde_json::json;
    use std::collections::HashSet;

    async fn test_store() -> (tempfile::TempDir, SqliteJobStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteJobStore::new(pool))
    }

    async fn seed(store: &SqliteJobStore, key: &str, max_attempts: u32) -> JobDefinition {
        let def = JobDefinition {
            id: Uuid::now_v7(),
            key: key.to_string(),
            arg_schema: Default::default(),
            timeout_seconds: 60,
            max_attempts,
            is_active: true,
            created_at: Utc::now(),
        };
        store.create_definition(&def).await.unwrap();
        def
    }

    fn new_job(key: &str, tenant: Uuid) -> NewJob {
        NewJob {
            definition_key: key.to_string(),
            tenant_id: tenant,
            payload: json!({}),
            priority: 100,
            scheduled_for: None,
            dedupe_key: None,
            max_attempts: None,
            source: JobSource::Manual,
            source_ref: None,
        }
    }

    /// Rewind a backoff-delayed job so the next claim sees it.
    async fn make_claimable(store: &SqliteJobStore, job_id: Uuid) {
        sqlx::query("UPDATE jobs SET scheduled_for = ? WHERE id = ?")
            .bind(format_datetime(&(Utc::now() - Duration::seconds(1))))
            .bind(job_id.to_string())
            .execute(&store.pool.writer)
            .await
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_definition_roundtrip() {
        let (_dir, store) = test_store().await;
        let def = seed(&store, "photos.sync-library", 3).await;
        let fetched = store.get_definition("photos.sync-library").await.unwrap().unwrap();
        assert_eq!(fetched.id, def.id);
        assert_eq!(fetched.max_attempts, 3);
        assert!(fetched.is_active);

        let by_id = store.get_definition_by_id(def.id).await.unwrap().unwrap();
        assert_eq!(by_id.key, "photos.sync-library");
    }

    #[tokio::test]
    async fn test_duplicate_definition_key_conflicts() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let dup = JobDefinition {
            id: Uuid::now_v7(),
            key: "photos.sync-library".to_string(),
            arg_schema: Default::default(),
            timeout_seconds: 30,
            max_attempts: 1,
            is_active: true,
            created_at: Utc::now(),
        };
        let err = store.create_definition(&dup).await.unwrap_err();
        assert!(matches!(err, QueueError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_retired_definition_rejects_enqueue() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        assert!(store.retire_definition("photos.sync-library").await.unwrap());

        let err = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    // -----------------------------------------------------------------------
    // Enqueue and dedupe
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_enqueue_get_roundtrip() {
        let (_dir, store) = test_store().await;
        let def = seed(&store, "photos.sync-library", 3).await;
        let tenant = Uuid::now_v7();
        let mut new = new_job("photos.sync-library", tenant);
        new.priority = 50;
        new.source_ref = Some("webhook:42".to_string());

        let job = store.enqueue(new).await.unwrap();
        let fetched = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.definition_id, def.id);
        assert_eq!(fetched.tenant_id, tenant);
        assert_eq!(fetched.priority, 50);
        assert_eq!(fetched.max_attempts, 3);
        assert_eq!(fetched.source_ref.as_deref(), Some("webhook:42"));
        assert!(!fetched.cancel_requested);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_schema_violation() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let mut new = new_job("photos.sync-library", Uuid::now_v7());
        new.payload = json!({"unexpected": 1});
        let err = store.enqueue(new).await.unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
    }

    #[tokio::test]
    async fn test_dedupe_key_conflicts_while_active() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let tenant = Uuid::now_v7();

        let mut first = new_job("photos.sync-library", tenant);
        first.dedupe_key = Some("sync:lib-1".to_string());
        let job = store.enqueue(first).await.unwrap();

        let mut second = new_job("photos.sync-library", tenant);
        second.dedupe_key = Some("sync:lib-1".to_string());
        let err = store.enqueue(second.clone()).await.unwrap_err();
        assert!(matches!(err, QueueError::Conflict(_)));

        // A different tenant is unaffected.
        let mut other = new_job("photos.sync-library", Uuid::now_v7());
        other.dedupe_key = Some("sync:lib-1".to_string());
        store.enqueue(other).await.unwrap();

        // Once the job settles, the key is free again.
        let claimed = store.claim("w1", 10, 60).await.unwrap();
        let target = claimed.iter().find(|j| j.id == job.id).unwrap();
        store
            .complete(target.id, "w1", 0, AttemptLogs::default())
            .await
            .unwrap();
        store.enqueue(second).await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Claim
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_claim_orders_by_priority_then_fifo() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let tenant = Uuid::now_v7();

        let mut low = new_job("photos.sync-library", tenant);
        low.priority = 200;
        let low = store.enqueue(low).await.unwrap();
        let first = store.enqueue(new_job("photos.sync-library", tenant)).await.unwrap();
        let second = store.enqueue(new_job("photos.sync-library", tenant)).await.unwrap();

        let claimed = store.claim("w1", 2, 60).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, first.id);
        assert_eq!(claimed[1].id, second.id);

        let rest = store.claim("w1", 2, 60).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, low.id);
    }

    #[tokio::test]
    async fn test_claim_skips_future_scheduled_jobs() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let mut new = new_job("photos.sync-library", Uuid::now_v7());
        new.scheduled_for = Some(Utc::now() + Duration::hours(1));
        store.enqueue(new).await.unwrap();

        assert!(store.claim("w1", 10, 60).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_creates_running_attempt_row() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();

        let claimed = store.claim("w1", 1, 60).await.unwrap();
        assert_eq!(claimed[0].attempt_count, 1);
        assert_eq!(claimed[0].claimed_by_worker.as_deref(), Some("w1"));
        assert!(claimed[0].lease_expires_at.is_some());
        assert!(claimed[0].started_at.is_some());

        let attempts = store.list_attempts(job.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt_no, 1);
        assert_eq!(attempts[0].status, AttemptStatus::Running);
        assert_eq!(attempts[0].worker_id, "w1");
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_share_a_job() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let tenant = Uuid::now_v7();
        for _ in 0..12 {
            store
                .enqueue(new_job("photos.sync-library", tenant))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim(&format!("w{i}"), 5, 60).await.unwrap()
            }));
        }

        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for job in handle.await.unwrap() {
                assert!(seen.insert(job.id), "job {} claimed twice", job.id);
                total += 1;
            }
        }
        assert_eq!(total, 12);
    }

    #[tokio::test]
    async fn test_stale_lease_is_reclaimed_with_attempts_left() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();

        // w1 claims with an already-expired lease and is never heard from.
        let claimed = store.claim("w1", 1, 0).await.unwrap();
        assert_eq!(claimed.len(), 1);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let reclaimed = store.claim("w2", 1, 60).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, job.id);
        assert_eq!(reclaimed[0].attempt_count, 2);
        assert_eq!(reclaimed[0].claimed_by_worker.as_deref(), Some("w2"));

        let attempts = store.list_attempts(job.id).await.unwrap();
        assert_eq!(attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_reclaim_finalizes_superseded_attempt() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();

        store.claim("w1", 1, 0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        store.claim("w2", 1, 60).await.unwrap();

        // The orphaned first attempt is closed out as a timeout; only the
        // reclaiming worker's attempt is still running.
        let attempts = store.list_attempts(job.id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        let first = attempts.iter().find(|a| a.attempt_no == 1).unwrap();
        assert_eq!(first.status, AttemptStatus::Timeout);
        assert!(first.finished_at.is_some());
        assert!(
            first
                .error_text
                .as_deref()
                .is_some_and(|e| e.contains("lease expired"))
        );
        let second = attempts.iter().find(|a| a.attempt_no == 2).unwrap();
        assert_eq!(second.status, AttemptStatus::Running);
        assert_eq!(second.worker_id, "w2");
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_heartbeat_extends_lease() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();
        let claimed = store.claim("w1", 1, 10).await.unwrap();
        let before = claimed[0].lease_expires_at.unwrap();

        store.heartbeat(job.id, "w1", 600).await.unwrap();
        let after = store.get_job(job.id).await.unwrap().unwrap();
        assert!(after.lease_expires_at.unwrap() > before);
    }

    #[tokio::test]
    async fn test_heartbeat_wrong_worker_conflicts_without_mutation() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();
        store.claim("w1", 1, 60).await.unwrap();
        let before = store.get_job(job.id).await.unwrap().unwrap();

        let err = store.heartbeat(job.id, "w2", 600).await.unwrap_err();
        assert!(matches!(err, QueueError::Conflict(_)));

        let after = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(after.lease_expires_at, before.lease_expires_at);
        assert_eq!(after.claimed_by_worker.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_job_not_found() {
        let (_dir, store) = test_store().await;
        let err = store.heartbeat(Uuid::now_v7(), "w1", 60).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound));
    }

    // -----------------------------------------------------------------------
    // Retry and dead-letter lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_fail_fail_succeed_lifecycle() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();

        // Attempt 1 fails; backoff pushes scheduled_for into the future.
        store.claim("w1", 1, 60).await.unwrap();
        let failed = store
            .fail(job.id, "w1", AttemptStatus::Failed, true, "exit code 1", AttemptLogs::default())
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Queued);
        assert!(failed.scheduled_for > Utc::now() + Duration::seconds(250));

        // Attempt 2 fails with a longer delay.
        make_claimable(&store, job.id).await;
        store.claim("w1", 1, 60).await.unwrap();
        let failed = store
            .fail(job.id, "w1", AttemptStatus::Failed, true, "exit code 1", AttemptLogs::default())
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Queued);
        assert!(failed.scheduled_for > Utc::now() + Duration::seconds(550));

        // Attempt 3 succeeds.
        make_claimable(&store, job.id).await;
        store.claim("w1", 1, 60).await.unwrap();
        let done = store
            .complete(job.id, "w1", 0, AttemptLogs::default())
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.attempt_count, 3);

        let attempts = store.list_attempts(job.id).await.unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(attempts[1].status, AttemptStatus::Failed);
        assert_eq!(attempts[2].status, AttemptStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_attempt_budget_exhaustion_dead_letters() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 2).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();

        store.claim("w1", 1, 60).await.unwrap();
        store
            .fail(job.id, "w1", AttemptStatus::Failed, true, "exit code 1", AttemptLogs::default())
            .await
            .unwrap();
        make_claimable(&store, job.id).await;
        store.claim("w1", 1, 60).await.unwrap();
        let ended = store
            .fail(job.id, "w1", AttemptStatus::Failed, true, "exit code 1", AttemptLogs::default())
            .await
            .unwrap();
        assert_eq!(ended.status, JobStatus::DeadLetter);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_dead_letters_immediately() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 5).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();
        store.claim("w1", 1, 60).await.unwrap();
        let ended = store
            .fail(
                job.id,
                "w1",
                AttemptStatus::Failed,
                false,
                "invalid_grant",
                AttemptLogs::default(),
            )
            .await
            .unwrap();
        assert_eq!(ended.status, JobStatus::DeadLetter);
        assert_eq!(ended.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_expire_exhausted_dead_letters_stale_leases() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 1).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();
        store.claim("w1", 1, 0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let moved = store.expire_exhausted().await.unwrap();
        assert_eq!(moved, 1);
        let ended = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(ended.status, JobStatus::DeadLetter);
        assert!(ended.last_error.is_some());
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_cancel_queued_job_is_immediate() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();

        let canceled = store.cancel(job.id, "operator request").await.unwrap();
        assert_eq!(canceled.status, JobStatus::Canceled);
        assert_eq!(canceled.last_error.as_deref(), Some("operator request"));

        // Terminal; the claimer never sees it.
        assert!(store.claim("w1", 10, 60).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_running_job_records_intent_only() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();
        store.claim("w1", 1, 60).await.unwrap();

        let flagged = store.cancel(job.id, "operator request").await.unwrap();
        assert_eq!(flagged.status, JobStatus::Running);
        assert!(flagged.cancel_requested);

        let confirmed = store
            .confirm_cancel(job.id, "w1", AttemptLogs::default())
            .await
            .unwrap();
        assert_eq!(confirmed.status, JobStatus::Canceled);

        let attempts = store.list_attempts(job.id).await.unwrap();
        assert_eq!(attempts[0].status, AttemptStatus::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_is_noop() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();
        store.claim("w1", 1, 60).await.unwrap();
        store
            .complete(job.id, "w1", 0, AttemptLogs::default())
            .await
            .unwrap();

        let unchanged = store.cancel(job.id, "too late").await.unwrap();
        assert_eq!(unchanged.status, JobStatus::Succeeded);
        assert!(!unchanged.cancel_requested);
    }

    // -----------------------------------------------------------------------
    // Observability
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_update_attempt_logs_and_pid() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let job = store
            .enqueue(new_job("photos.sync-library", Uuid::now_v7()))
            .await
            .unwrap();
        store.claim("w1", 1, 60).await.unwrap();

        store.record_attempt_pid(job.id, 1, 4242).await.unwrap();
        store
            .update_attempt_logs(
                job.id,
                1,
                &AttemptLogs {
                    stdout_tail: "synced 40 items".to_string(),
                    stderr_tail: String::new(),
                },
            )
            .await
            .unwrap();

        let attempts = store.list_attempts(job.id).await.unwrap();
        assert_eq!(attempts[0].pid, Some(4242));
        assert_eq!(attempts[0].stdout_tail, "synced 40 items");
    }

    #[tokio::test]
    async fn test_list_jobs_filters_by_status() {
        let (_dir, store) = test_store().await;
        seed(&store, "photos.sync-library", 3).await;
        let tenant = Uuid::now_v7();
        store.enqueue(new_job("photos.sync-library", tenant)).await.unwrap();
        let done = store.enqueue(new_job("photos.sync-library", tenant)).await.unwrap();
        let claimed = store.claim("w1", 1, 60).await.unwrap();
        store
            .complete(claimed[0].id, "w1", 0, AttemptLogs::default())
            .await
            .unwrap();

        let queued = store
            .list_jobs(tenant, Some(JobStatus::Queued), 10)
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, done.id);

        let all = store.list_jobs(tenant, None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_worker_heartbeat_row() {
        let (_dir, store) = test_store().await;
        store.upsert_worker("w1", 2, Utc::now()).await.unwrap();
        store.upsert_worker("w1", 0, Utc::now()).await.unwrap();

        let row: (String, i64) =
            sqlx::query_as("SELECT worker_id, running_count FROM job_workers WHERE worker_id = 'w1'")
                .fetch_one(&store.pool.reader)
                .await
                .unwrap();
        assert_eq!(row.0, "w1");
        assert_eq!(row.1, 0);
    }
}
