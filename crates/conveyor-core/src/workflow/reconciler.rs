//! Periodic reconciliation sweep.
//!
//! The event-driven path can miss transitions (worker crash between store
//! write and hook, process restart). The reconciler repairs this: every
//! interval it dead-letters jobs whose lease expired with no attempts left
//! and re-derives every running workflow run through the same `advance`
//! sweep the event path uses. Because `advance` is idempotent, running the
//! sweep against a healthy system writes nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::repository::{JobStore, WorkflowRepository};
use crate::workflow::engine::WorkflowEngine;

/// What one sweep found and fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Jobs dead-lettered because their lease expired with the attempt
    /// budget exhausted.
    pub jobs_expired: u64,
    /// Running runs examined.
    pub runs_swept: usize,
    /// Runs where the sweep actually wrote something.
    pub runs_advanced: usize,
}

pub struct Reconciler<S, R> {
    store: Arc<S>,
    repo: Arc<R>,
    engine: Arc<WorkflowEngine<S, R>>,
    interval: Duration,
}

impl<S, R> Reconciler<S, R>
where
    S: JobStore + 'static,
    R: WorkflowRepository + 'static,
{
    pub fn new(
        store: Arc<S>,
        repo: Arc<R>,
        engine: Arc<WorkflowEngine<S, R>>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            repo,
            engine,
            interval,
        }
    }

    /// One full pass. Per-run failures are logged and skipped so one bad run
    /// cannot stall the rest of the sweep.
    pub async fn sweep(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        match self.store.expire_exhausted().await {
            Ok(moved) => stats.jobs_expired = moved,
            Err(error) => warn!(%error, "expiring exhausted leases failed"),
        }

        let runs = match self.repo.list_running_runs().await {
            Ok(runs) => runs,
            Err(error) => {
                warn!(%error, "listing running runs failed");
                return stats;
            }
        };
        stats.runs_swept = runs.len();
        for run in &runs {
            match self.engine.advance(run.id).await {
                Ok(outcome) if outcome.changed => {
                    debug!(run_id = %run.id, steps_started = outcome.steps_started, "sweep advanced run");
                    stats.runs_advanced += 1;
                }
                Ok(_) => {}
                Err(error) => warn!(run_id = %run.id, %error, "sweep failed for run"),
            }
        }

        if stats.jobs_expired > 0 || stats.runs_advanced > 0 {
            info!(
                jobs_expired = stats.jobs_expired,
                runs_advanced = stats.runs_advanced,
                "reconcile sweep repaired state"
            );
        }
        stats
    }

    /// Start sweeping on a background task.
    pub fn spawn(self) -> ReconcilerHandle {
        let token = CancellationToken::new();
        let join = tokio::spawn({
            let token = token.clone();
            async move {
                let mut ticker = tokio::time::interval(self.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            self.sweep().await;
                        }
                    }
                }
            }
        });
        ReconcilerHandle { token, join }
    }
}

pub struct ReconcilerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(error) = self.join.await {
            error!(%error, "reconciler task panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
