//! Background sweep over pending tasks.
//!
//! Every `interval` the poller lists WAIT and RUN tasks and reconciles
//! them, at most `concurrency` at a time. Deadlines live on the individual
//! provider calls inside [`TaskService::reconcile`], so a slow download
//! never holds a task back from DONE. A failed or timed-out reconciliation
//! is retried on the next sweep.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gen3d_core::types::DbId;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PollerConfig;
use crate::error::ServiceError;
use crate::service::{ReconcileOutcome, TaskService};

/// Consecutive failures after which a task's errors are logged at `error`.
const ESCALATE_AFTER_FAILURES: u32 = 5;

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dispatched: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerStatus {
    pub running: bool,
    pub interval: Duration,
    pub pending_count: i64,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic reconciler with explicit start and stop.
pub struct TaskPoller {
    service: Arc<TaskService>,
    config: PollerConfig,
    state: tokio::sync::Mutex<Option<Running>>,
    failures: Arc<FailureTracker>,
}

impl TaskPoller {
    pub fn new(service: Arc<TaskService>, config: PollerConfig) -> Self {
        Self {
            service,
            config,
            state: tokio::sync::Mutex::new(None),
            failures: Arc::new(FailureTracker::default()),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Spawn the sweep loop. The first sweep runs immediately.
    ///
    /// Returns `false` if the loop was already running.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&self.service),
            self.config.clone(),
            Arc::clone(&self.failures),
            cancel.clone(),
        ));
        *state = Some(Running { cancel, handle });
        true
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// An in-flight sweep runs to completion first, bounded by the provider
    /// call deadlines. Returns `false` if the loop was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.state.lock().await.take() else {
            return false;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::error!(error = %e, "Task poller exited abnormally");
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub async fn status(&self) -> Result<PollerStatus, ServiceError> {
        Ok(PollerStatus {
            running: self.is_running().await,
            interval: self.config.interval,
            pending_count: self.service.pending_count().await?,
        })
    }

    /// Run one sweep now, independent of the background loop.
    pub async fn sweep(&self) -> Result<SweepReport, ServiceError> {
        sweep_pending(&self.service, &self.config, &self.failures).await
    }
}

async fn run(
    service: Arc<TaskService>,
    config: PollerConfig,
    failures: Arc<FailureTracker>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(
        interval_ms = config.interval.as_millis() as u64,
        concurrency = config.concurrency,
        "Task poller started",
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task poller shutting down");
                break;
            }
            _ = ticker.tick() => {
                match sweep_pending(&service, &config, &failures).await {
                    Ok(report) if report.dispatched > 0 => {
                        tracing::debug!(?report, "Sweep finished");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Sweep failed to list pending tasks");
                    }
                }
            }
        }
    }
}

/// List pending tasks and reconcile them under the concurrency cap.
async fn sweep_pending(
    service: &Arc<TaskService>,
    config: &PollerConfig,
    failures: &FailureTracker,
) -> Result<SweepReport, ServiceError> {
    let pending = service.get_pending_tasks().await?;
    failures.retain(&pending.iter().map(|t| t.id).collect());

    let mut report = SweepReport::default();
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut in_flight = JoinSet::new();

    for task in pending {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let service = Arc::clone(service);
        report.dispatched += 1;

        in_flight.spawn(async move {
            let _permit = permit;
            let result = service.reconcile(&task).await;
            (task.id, result)
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        let (task_id, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(error = %e, "Reconcile task aborted");
                report.failed += 1;
                continue;
            }
        };

        match result {
            Ok(outcome) => {
                failures.clear(task_id);
                match outcome {
                    ReconcileOutcome::Updated { .. } => report.updated += 1,
                    ReconcileOutcome::Unchanged => report.unchanged += 1,
                    ReconcileOutcome::SkippedTerminal | ReconcileOutcome::ClaimedElsewhere => {
                        report.skipped += 1
                    }
                }
            }
            Err(e) => {
                if e.is_timeout() {
                    report.timed_out += 1;
                } else {
                    report.failed += 1;
                }
                let consecutive = failures.record(task_id);
                if consecutive >= ESCALATE_AFTER_FAILURES {
                    tracing::error!(task_id, consecutive, error = %e, "Reconcile keeps failing");
                } else {
                    tracing::warn!(task_id, consecutive, error = %e, "Reconcile failed");
                }
            }
        }
    }

    Ok(report)
}

/// Consecutive reconcile failures per task, reset on success.
#[derive(Default)]
struct FailureTracker {
    counts: Mutex<HashMap<DbId, u32>>,
}

impl FailureTracker {
    fn record(&self, id: DbId) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(id).or_default();
        *count += 1;
        *count
    }

    fn clear(&self, id: DbId) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Forget tasks that are no longer pending.
    fn retain(&self, pending: &HashSet<DbId>) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, _| pending.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_counts_reset_and_prune() {
        let tracker = FailureTracker::default();
        assert_eq!(tracker.record(1), 1);
        assert_eq!(tracker.record(1), 2);
        assert_eq!(tracker.record(2), 1);

        tracker.clear(1);
        assert_eq!(tracker.record(1), 1);

        tracker.retain(&HashSet::from([1]));
        assert_eq!(tracker.record(2), 1);
        assert_eq!(tracker.record(1), 2);
    }
}
