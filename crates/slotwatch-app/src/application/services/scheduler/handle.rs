use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use slotwatch_domain::{
    Clock, DateOutcomeRegistry, MonitoringWindow, RunId, RunResult, StopReason, Target, WorkerId,
};

use super::task_spawner::WorkerTasks;
use super::types::ShutdownReport;

/// Time granted to abandoned tasks and the event dispatcher once the grace
/// period is spent.
const FLUSH_WINDOW: Duration = Duration::from_millis(200);

/// A running scheduler. Dropping the handle without `await_all` or `stop`
/// aborts every worker.
pub struct SchedulerHandle {
    pub(super) run_id: RunId,
    pub(super) tasks: WorkerTasks,
    /// Targets whose worker has not reported a result yet
    pub(super) pending: BTreeMap<WorkerId, Target>,
    pub(super) results: Vec<RunResult>,
    pub(super) cancel: CancellationToken,
    pub(super) registry: Arc<DateOutcomeRegistry>,
    pub(super) window: watch::Sender<MonitoringWindow>,
    pub(super) dispatcher: JoinHandle<()>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) grace_timeout: Duration,
    pub(super) worker_count: usize,
}

impl SchedulerHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Token observed by every worker; cancelling it requests a stop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> Arc<DateOutcomeRegistry> {
        Arc::clone(&self.registry)
    }

    /// Number of workers allowed to run at once.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Publish new business hours. Gated workers recompute immediately.
    pub fn update_window(&self, window: MonitoringWindow) {
        info!(
            enabled = window.enabled(),
            start_hour = window.start_hour(),
            end_hour = window.end_hour(),
            "🕘 Monitoring window updated"
        );
        self.window.send_replace(window);
    }

    /// Wait until every worker is terminal.
    ///
    /// If the token is cancelled meanwhile, the remaining workers get the
    /// configured grace period before they are abandoned.
    pub async fn await_all(self) -> Vec<RunResult> {
        self.await_report().await.results
    }

    /// Like [`await_all`](Self::await_all), but keeps what the shutdown
    /// observed. `elapsed` is zero when the run settled without a cancel.
    pub async fn await_report(mut self) -> ShutdownReport {
        let cancelled = loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    Some(joined) => self.collect(joined),
                    None => break false,
                },
                _ = self.cancel.cancelled() => break true,
            }
        };

        if cancelled {
            info!("🛑 Cancellation requested, draining workers");
            let grace = self.grace_timeout;
            return self.shutdown(grace).await;
        }

        self.drain_events(None).await;
        ShutdownReport {
            abandoned: 0,
            deadline_exceeded: false,
            elapsed: Duration::ZERO,
            results: self.into_sorted_results(),
        }
    }

    /// Cancel every worker and wait at most `grace` for them to finish.
    pub async fn stop(mut self, grace: Duration) -> ShutdownReport {
        info!(grace_secs = grace.as_secs(), "🛑 Stopping scheduler");
        self.cancel.cancel();
        self.shutdown(grace).await
    }

    async fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        let started = Instant::now();
        let deadline = started + grace;

        while let Ok(Some(joined)) =
            tokio::time::timeout_at(deadline, self.tasks.join_next()).await
        {
            self.collect(joined);
        }

        let abandoned = self.pending.len();
        if abandoned > 0 {
            error!(
                abandoned,
                grace_secs = grace.as_secs(),
                "❌ Shutdown deadline exceeded, abandoning workers"
            );
            self.tasks.abort_all();
            let finished_at = self.clock.now();
            for (id, target) in std::mem::take(&mut self.pending) {
                warn!(
                    worker_id = %id,
                    source = %target.source(),
                    date = %target.date(),
                    "⏹️  Worker abandoned"
                );
                self.results.push(RunResult::stopped(
                    target,
                    Some(id),
                    StopReason::Aborted,
                    finished_at,
                ));
            }
        }

        let flush_deadline = deadline.max(Instant::now() + FLUSH_WINDOW);
        // Aborted tasks release their sessions and event senders when dropped
        if tokio::time::timeout_at(flush_deadline, self.tasks.shutdown())
            .await
            .is_err()
        {
            warn!("Abandoned workers did not unwind in time");
        }
        self.drain_events(Some(flush_deadline)).await;

        let elapsed = started.elapsed();
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            abandoned,
            "✅ Scheduler stopped"
        );

        ShutdownReport {
            abandoned,
            deadline_exceeded: abandoned > 0,
            elapsed,
            results: self.into_sorted_results(),
        }
    }

    fn collect(&mut self, joined: Result<(WorkerId, Option<RunResult>), JoinError>) {
        match joined {
            Ok((id, result)) => {
                let target = self.pending.remove(&id);
                match (result, target) {
                    (Some(result), _) => self.results.push(result),
                    (None, Some(target)) => {
                        let finished_at = self.clock.now();
                        self.results.push(RunResult::stopped(
                            target,
                            Some(id),
                            StopReason::Aborted,
                            finished_at,
                        ));
                    }
                    (None, None) => {}
                }
            }
            // Only aborted tasks end up here; their targets stay pending
            Err(e) => warn!("Worker task ended without a result: {}", e),
        }
    }

    /// Wait for the dispatcher to deliver everything queued. It stops once
    /// the last worker has dropped its event sender.
    async fn drain_events(&mut self, deadline: Option<Instant>) {
        let joined = match deadline {
            None => (&mut self.dispatcher).await,
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, &mut self.dispatcher).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("Event dispatcher did not drain in time, dropping queued events");
                        self.dispatcher.abort();
                        return;
                    }
                }
            }
        };
        if let Err(e) = joined {
            error!("Event dispatcher failed: {}", e);
        }
    }

    fn into_sorted_results(self) -> Vec<RunResult> {
        let mut results = self.results;
        results.sort_by(|a, b| {
            (a.target.date(), a.target.source()).cmp(&(b.target.date(), b.target.source()))
        });
        let won = results.iter().filter(|r| r.succeeded).count();
        info!(won, total = results.len(), "🏁 All targets settled");
        results
    }
}
