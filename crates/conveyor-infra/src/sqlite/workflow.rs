//! SQLite workflow repository implementation.
//!
//! Definitions are stored as one JSON document per key; runs and step runs
//! get relational rows so the reconciler and the engine can query them by
//! status and by child job.

use chrono::Utc;
use conveyor_core::repository::WorkflowRepository;
use conveyor_types::error::QueueError;
use conveyor_types::workflow::{
    RunStatus, StepStatus, WorkflowDefinition, WorkflowRun, WorkflowStepRun,
};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{enum_from_str, enum_str, format_datetime, parse_datetime, parse_uuid, storage};

/// SQLite-backed implementation of `WorkflowRepository`.
#[derive(Clone)]
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

const RUN_COLUMNS: &str = "id, tenant_id, workflow_id, workflow_key, status, payload, priority, \
     max_parallel_steps, failure_policy, started_at, finished_at, error";

struct RunRow {
    id: String,
    tenant_id: String,
    workflow_id: String,
    workflow_key: String,
    status: String,
    payload: String,
    priority: i64,
    max_parallel_steps: i64,
    failure_policy: String,
    started_at: String,
    finished_at: Option<String>,
    error: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_key: row.try_get("workflow_key")?,
            status: row.try_get("status")?,
            payload: row.try_get("payload")?,
            priority: row.try_get("priority")?,
            max_parallel_steps: row.try_get("max_parallel_steps")?,
            failure_policy: row.try_get("failure_policy")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            error: row.try_get("error")?,
        })
    }

    fn into_run(self) -> Result<WorkflowRun, QueueError> {
        Ok(WorkflowRun {
            id: parse_uuid(&self.id)?,
            tenant_id: parse_uuid(&self.tenant_id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            workflow_key: self.workflow_key,
            status: enum_from_str(&self.status)?,
            payload: serde_json::from_str(&self.payload)
                .map_err(|e| QueueError::Storage(format!("invalid run payload JSON: {e}")))?,
            priority: self.priority as i32,
            max_parallel_steps: self.max_parallel_steps as u32,
            failure_policy: enum_from_str(&self.failure_policy)?,
            started_at: parse_datetime(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(parse_datetime).transpose()?,
            error: self.error,
        })
    }
}

const STEP_COLUMNS: &str =
    "id, run_id, step_key, definition_key, status, depends_on, child_job_id, error";

struct StepRow {
    id: String,
    run_id: String,
    step_key: String,
    definition_key: String,
    status: String,
    depends_on: String,
    child_job_id: Option<String>,
    error: Option<String>,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            step_key: row.try_get("step_key")?,
            definition_key: row.try_get("definition_key")?,
            status: row.try_get("status")?,
            depends_on: row.try_get("depends_on")?,
            child_job_id: row.try_get("child_job_id")?,
            error: row.try_get("error")?,
        })
    }

    fn into_step(self) -> Result<WorkflowStepRun, QueueError> {
        Ok(WorkflowStepRun {
            id: parse_uuid(&self.id)?,
            run_id: parse_uuid(&self.run_id)?,
            step_key: self.step_key,
            definition_key: self.definition_key,
            status: enum_from_str(&self.status)?,
            depends_on: serde_json::from_str(&self.depends_on)
                .map_err(|e| QueueError::Storage(format!("invalid depends_on JSON: {e}")))?,
            child_job_id: self.child_job_id.as_deref().map(parse_uuid).transpose()?,
            error: self.error,
        })
    }
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), QueueError> {
        let body = serde_json::to_string(def).map_err(storage)?;
        let now = format_datetime(&Utc::now());
        sqlx::query(
            "INSERT INTO workflow_definitions (id, key, definition, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               definition = excluded.definition,
               updated_at = excluded.updated_at",
        )
        .bind(def.id.to_string())
        .bind(&def.key)
        .bind(&body)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn get_definition(&self, key: &str) -> Result<Option<WorkflowDefinition>, QueueError> {
        let row = sqlx::query("SELECT definition FROM workflow_definitions WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(storage)?;
        row.map(|r| {
            let body: String = r.try_get("definition").map_err(storage)?;
            serde_json::from_str(&body)
                .map_err(|e| QueueError::Storage(format!("invalid workflow definition JSON: {e}")))
        })
        .transpose()
    }

    async fn create_run(
        &self,
        run: &WorkflowRun,
        steps: &[WorkflowStepRun],
    ) -> Result<(), QueueError> {
        let payload_json = serde_json::to_string(&run.payload).map_err(storage)?;
        let mut tx = self.pool.writer.begin().await.map_err(storage)?;

        sqlx::query(
            "INSERT INTO workflow_runs
             (id, tenant_id, workflow_id, workflow_key, status, payload, priority,
              max_parallel_steps, failure_policy, started_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(run.tenant_id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(&run.workflow_key)
        .bind(enum_str(&run.status)?)
        .bind(&payload_json)
        .bind(run.priority as i64)
        .bind(run.max_parallel_steps as i64)
        .bind(enum_str(&run.failure_policy)?)
        .bind(format_datetime(&run.started_at))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        for step in steps {
            let depends_json = serde_json::to_string(&step.depends_on).map_err(storage)?;
            sqlx::query(
                "INSERT INTO workflow_step_runs
                 (id, run_id, step_key, definition_key, status, depends_on)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(step.id.to_string())
            .bind(step.run_id.to_string())
            .bind(&step.step_key)
            .bind(&step.definition_key)
            .bind(enum_str(&step.status)?)
            .bind(&depends_json)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, QueueError> {
        let query = format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(storage)?;
        row.map(|r| RunRow::from_row(&r).map_err(storage)?.into_run())
            .transpose()
    }

    async fn list_running_runs(&self) -> Result<Vec<WorkflowRun>, QueueError> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs
             WHERE status = 'running' ORDER BY started_at ASC"
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(storage)?;
        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            runs.push(RunRow::from_row(row).map_err(storage)?.into_run()?);
        }
        Ok(runs)
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let finished_at = status.is_terminal().then(|| format_datetime(&Utc::now()));
        sqlx::query(
            "UPDATE workflow_runs
             SET status = ?, finished_at = COALESCE(?, finished_at), error = COALESCE(?, error)
             WHERE id = ?",
        )
        .bind(enum_str(&status)?)
        .bind(finished_at)
        .bind(error)
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn list_step_runs(&self, run_id: Uuid) -> Result<Vec<WorkflowStepRun>, QueueError> {
        let query = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_step_runs
             WHERE run_id = ? ORDER BY step_key ASC"
        );
        let rows = sqlx::query(&query)
            .bind(run_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(storage)?;
        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            steps.push(StepRow::from_row(row).map_err(storage)?.into_step()?);
        }
        Ok(steps)
    }

    async fn update_step(
        &self,
        step_run_id: Uuid,
        status: StepStatus,
        child_job_id: Option<Uuid>,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE workflow_step_runs
             SET status = ?,
                 child_job_id = COALESCE(?, child_job_id),
                 error = COALESCE(?, error)
             WHERE id = ?",
        )
        .bind(enum_str(&status)?)
        .bind(child_job_id.map(|id| id.to_string()))
        .bind(error)
        .bind(step_run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn find_step_by_child_job(
        &self,
        job_id: Uuid,
    ) -> Result<Option<WorkflowStepRun>, QueueError> {
        let query = format!("SELECT {STEP_COLUMNS} FROM workflow_step_runs WHERE child_job_id = ?");
        let row = sqlx::query(&query)
            .bind(job_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(storage)?;
        row.map(|r| StepRow::from_row(&r).map_err(storage)?.into_step())
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
