//! Worker: claims jobs, runs them as subprocesses, reports outcomes.
//!
//! The polling loop claims a batch every tick and executes each job on its
//! own task. While a subprocess runs, the attempt task multiplexes four
//! concerns over one select loop: waiting for exit, the wall-clock timeout,
//! periodic log flush + lease heartbeat, and the cancellation poll. All
//! state transitions go through the store; the worker holds nothing the
//! lease protocol cannot recover after a crash.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use conveyor_types::config::WorkerSettings;
use conveyor_types::error::QueueError;
use conveyor_types::job::{AttemptLogs, AttemptStatus, Job};

use crate::queue::classify::classify_output;
use crate::queue::command::CommandBuilder;
use crate::repository::JobStore;

/// Called with the final job record whenever an attempt leaves a job in a
/// terminal state. The workflow engine hangs off this to advance runs.
pub type TerminalHook = Arc<dyn Fn(Job) -> BoxFuture<'static, ()> + Send + Sync>;

// ---------------------------------------------------------------------------
// Tail buffer
// ---------------------------------------------------------------------------

/// Bounded output capture: keeps the most recent `cap` bytes of a stream,
/// trimming from the front on a char boundary.
pub(crate) struct TailBuffer {
    cap: usize,
    data: String,
}

impl TailBuffer {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            data: String::new(),
        }
    }

    pub(crate) fn push(&mut self, chunk: &str) {
        self.data.push_str(chunk);
        if self.data.len() > self.cap {
            let mut cut = self.data.len() - self.cap;
            while !self.data.is_char_boundary(cut) {
                cut += 1;
            }
            self.data.drain(..cut);
        }
    }

    pub(crate) fn contents(&self) -> &str {
        &self.data
    }
}

async fn drain_stream<R>(mut pipe: R, tail: Arc<Mutex<TailBuffer>>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => tail.lock().await.push(&String::from_utf8_lossy(&buf[..n])),
        }
    }
}

async fn snapshot(stdout: &Mutex<TailBuffer>, stderr: &Mutex<TailBuffer>) -> AttemptLogs {
    AttemptLogs {
        stdout_tail: stdout.lock().await.contents().to_string(),
        stderr_tail: stderr.lock().await.contents().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// A single worker process identity: polls the store, executes claimed jobs
/// as subprocesses and reports every outcome back through the store.
pub struct Worker<S, B> {
    store: Arc<S>,
    builder: Arc<B>,
    worker_id: String,
    settings: WorkerSettings,
    in_flight: DashMap<Uuid, ()>,
    on_terminal: Option<TerminalHook>,
}

/// How a supervised subprocess left the wait loop.
enum WaitEnd {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Canceled,
    LeaseLost(QueueError),
}

impl<S, B> Worker<S, B>
where
    S: JobStore + 'static,
    B: CommandBuilder + 'static,
{
    pub fn new(
        store: Arc<S>,
        builder: Arc<B>,
        worker_id: impl Into<String>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            builder,
            worker_id: worker_id.into(),
            settings,
            in_flight: DashMap::new(),
            on_terminal: None,
        }
    }

    pub fn with_terminal_hook(mut self, hook: TerminalHook) -> Self {
        self.on_terminal = Some(hook);
        self
    }

    /// Start the polling loop on a background task. The returned handle owns
    /// the shutdown token; dropping it does not stop the worker.
    pub fn spawn(self) -> WorkerHandle {
        let token = CancellationToken::new();
        let worker = Arc::new(self);
        let join = tokio::spawn({
            let token = token.clone();
            async move { worker.run(token).await }
        });
        WorkerHandle { token, join }
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        info!(worker_id = %self.worker_id, "worker started");
        let mut poll = tokio::time::interval(Duration::from_secs(self.settings.poll_interval_secs));
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.settings.heartbeat_interval_secs));
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = poll.tick() => {
                    while tasks.try_join_next().is_some() {}
                    self.claim_batch(&mut tasks).await;
                }
                _ = heartbeat.tick() => {
                    let running = self.in_flight.len() as u32;
                    if let Err(error) = self
                        .store
                        .upsert_worker(&self.worker_id, running, Utc::now())
                        .await
                    {
                        warn!(%error, "worker heartbeat failed");
                    }
                }
            }
        }

        // Graceful shutdown: stop claiming, let running attempts finish.
        info!(worker_id = %self.worker_id, in_flight = tasks.len(), "worker draining");
        while tasks.join_next().await.is_some() {}
        info!(worker_id = %self.worker_id, "worker stopped");
    }

    async fn claim_batch(self: &Arc<Self>, tasks: &mut JoinSet<()>) {
        let claimed = self
            .store
            .claim(
                &self.worker_id,
                self.settings.batch_size,
                self.settings.lease_seconds,
            )
            .await;
        let jobs = match claimed {
            Ok(jobs) => jobs,
            Err(error) => {
                warn!(%error, "claim failed; retrying next tick");
                return;
            }
        };
        for job in jobs {
            let worker = Arc::clone(self);
            tasks.spawn(async move { worker.execute(job).await });
        }
    }

    /// Claim one batch and run every job in it to completion. One-shot CLI
    /// mode and tests.
    pub async fn run_once(&self) -> Result<usize, QueueError> {
        let jobs = self
            .store
            .claim(
                &self.worker_id,
                self.settings.batch_size,
                self.settings.lease_seconds,
            )
            .await?;
        let count = jobs.len();
        for job in jobs {
            self.execute(job).await;
        }
        Ok(count)
    }

    async fn execute(&self, job: Job) {
        let job_id = job.id;
        self.in_flight.insert(job_id, ());
        debug!(%job_id, attempt = job.attempt_count, "attempt started");
        let result = self.run_attempt(&job).await;
        self.in_flight.remove(&job_id);

        let finished = match result {
            Ok(job) => job,
            Err(error) => {
                // Store-side failure mid-attempt. Record it as a transient
                // attempt failure; if even that fails, the lease will expire
                // and another claimant picks the job up.
                warn!(%job_id, %error, "attempt aborted");
                let recorded = self
                    .store
                    .fail(
                        job_id,
                        &self.worker_id,
                        AttemptStatus::Failed,
                        true,
                        &error.to_string(),
                        AttemptLogs::default(),
                    )
                    .await;
                match recorded {
                    Ok(job) => job,
                    Err(store_error) => {
                        error!(%job_id, %store_error, "could not record aborted attempt");
                        return;
                    }
                }
            }
        };

        debug!(%job_id, status = ?finished.status, "attempt finished");
        if finished.status.is_terminal()
            && let Some(hook) = &self.on_terminal
        {
            hook(finished).await;
        }
    }

    async fn run_attempt(&self, job: &Job) -> Result<Job, QueueError> {
        let def = self
            .store
            .get_definition_by_id(job.definition_id)
            .await?
            .ok_or_else(|| {
                QueueError::Storage(format!("definition {} not found", job.definition_id))
            })?;

        let spec = match self.builder.build(&def.key, &job.payload) {
            Ok(spec) => spec,
            Err(error) => {
                // No command mapping for the key: a deployment problem that
                // retrying cannot fix.
                return self
                    .store
                    .fail(
                        job.id,
                        &self.worker_id,
                        AttemptStatus::Failed,
                        false,
                        &error.to_string(),
                        AttemptLogs::default(),
                    )
                    .await;
            }
        };

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                return self
                    .store
                    .fail(
                        job.id,
                        &self.worker_id,
                        AttemptStatus::Failed,
                        true,
                        &format!("spawn failed: {error}"),
                        AttemptLogs::default(),
                    )
                    .await;
            }
        };

        if let Some(pid) = child.id() {
            self.store
                .record_attempt_pid(job.id, job.attempt_count, pid)
                .await?;
        }

        let stdout_tail = Arc::new(Mutex::new(TailBuffer::new(self.settings.tail_cap_chars)));
        let stderr_tail = Arc::new(Mutex::new(TailBuffer::new(self.settings.tail_cap_chars)));
        let stdout_reader = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(drain_stream(pipe, Arc::clone(&stdout_tail))));
        let stderr_reader = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain_stream(pipe, Arc::clone(&stderr_tail))));

        let deadline = tokio::time::sleep(Duration::from_secs(u64::from(def.timeout_seconds)));
        tokio::pin!(deadline);
        let mut flush =
            tokio::time::interval(Duration::from_secs(self.settings.log_flush_interval_secs));
        flush.tick().await;
        let mut cancel_poll =
            tokio::time::interval(Duration::from_secs(self.settings.cancel_poll_interval_secs));
        cancel_poll.tick().await;

        let wait_end = loop {
            tokio::select! {
                status = child.wait() => break WaitEnd::Exited(status),
                _ = &mut deadline => break WaitEnd::TimedOut,
                _ = flush.tick() => {
                    let logs = snapshot(&stdout_tail, &stderr_tail).await;
                    if let Err(error) = self
                        .store
                        .update_attempt_logs(job.id, job.attempt_count, &logs)
                        .await
                    {
                        debug!(job_id = %job.id, %error, "log flush failed");
                    }
                    if let Err(error) = self
                        .store
                        .heartbeat(job.id, &self.worker_id, self.settings.lease_seconds)
                        .await
                    {
                        // Lease rejected: another claimant may own the job
                        // now. Kill the subprocess and report nothing.
                        warn!(job_id = %job.id, %error, "lease heartbeat rejected; abandoning attempt");
                        break WaitEnd::LeaseLost(error);
                    }
                }
                _ = cancel_poll.tick() => {
                    match self.store.get_job(job.id).await {
                        Ok(Some(current)) if current.cancel_requested => {
                            info!(job_id = %job.id, "cancellation requested; killing subprocess");
                            break WaitEnd::Canceled;
                        }
                        Ok(_) => {}
                        Err(error) => debug!(job_id = %job.id, %error, "cancel poll failed"),
                    }
                }
            }
        };

        if !matches!(wait_end, WaitEnd::Exited(_)) {
            if let Err(error) = child.start_kill() {
                warn!(job_id = %job.id, %error, "kill failed");
            }
            let _ = child.wait().await;
        }
        for reader in [stdout_reader, stderr_reader].into_iter().flatten() {
            let _ = reader.await;
        }
        let logs = snapshot(&stdout_tail, &stderr_tail).await;

        match wait_end {
            WaitEnd::Exited(Ok(status)) if status.success() => {
                self.store.complete(job.id, &self.worker_id, 0, logs).await
            }
            WaitEnd::Exited(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                let kind = classify_output(&logs.stdout_tail, &logs.stderr_tail);
                self.store
                    .fail(
                        job.id,
                        &self.worker_id,
                        AttemptStatus::Failed,
                        kind.retryable(),
                        &format!("exit code {code}"),
                        logs,
                    )
                    .await
            }
            WaitEnd::Exited(Err(error)) => {
                self.store
                    .fail(
                        job.id,
                        &self.worker_id,
                        AttemptStatus::Failed,
                        true,
                        &format!("wait failed: {error}"),
                        logs,
                    )
                    .await
            }
            WaitEnd::TimedOut => {
                self.store
                    .fail(
                        job.id,
                        &self.worker_id,
                        AttemptStatus::Timeout,
                        true,
                        &format!("timed out after {}s", def.timeout_seconds),
                        logs,
                    )
                    .await
            }
            WaitEnd::Canceled => {
                self.store
                    .confirm_cancel(job.id, &self.worker_id, logs)
                    .await
            }
            WaitEnd::LeaseLost(error) => Err(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Supervisor handle for a spawned worker. Cancels the polling loop and
/// waits for in-flight attempts to drain.
pub struct WorkerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(error) = self.join.await {
            error!(%error, "worker task panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
