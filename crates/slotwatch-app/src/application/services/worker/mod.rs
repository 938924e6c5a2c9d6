//! One worker per target: gate on the monitoring window, keep a session
//! open, probe timeslots in order, race peers through the registry, and
//! recover from failures according to the retry policy.

mod state;


use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use slotwatch_domain::outcome::{DateOutcomeRegistry, RunResult, StopReason, Winner};
use slotwatch_domain::schedule::{
    FailureKind, MonitoringWindow, RetryDecision, SchedulerConfig,
};
use slotwatch_domain::session::{
    AcquireResult, ProbeOutcome, Reservation, SessionFactory, SlotError,
};
use slotwatch_domain::{Clock, Outcome, SchedulerEvent, Target, Timeslot, WorkerId};

use state::{Phase, WorkerState};

/// Everything a worker shares with the scheduler and its peers.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub config: Arc<SchedulerConfig>,
    pub registry: Arc<DateOutcomeRegistry>,
    pub factory: Arc<dyn SessionFactory>,
    pub clock: Arc<dyn Clock>,
    pub events: mpsc::UnboundedSender<SchedulerEvent>,
    pub window: watch::Receiver<MonitoringWindow>,
    /// Run-wide cooperative cancellation
    pub cancel: CancellationToken,
    /// Fired once the target's date is won, to cut peers' sleeps short
    pub date_won: CancellationToken,
}

enum Exit {
    Won(Timeslot),
    Stopped(StopReason),
}

/// Result of one pass over the timeslot list.
enum Sweep {
    Won(Timeslot),
    Stop(StopReason),
    /// Nothing claimable right now; sleep one polling interval
    Idle,
    Failed(SlotError),
}

/// Run `call` under `limit`, mapping expiry to a timeout error.
async fn with_timeout<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, SlotError>>,
) -> Result<T, SlotError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(SlotError::Timeout {
            operation,
            after: limit,
        }))
}

/// Holds a registry claim and releases it when dropped, including when a
/// collaborator call panics or the attempt is abandoned mid-call. Releasing
/// is a no-op once the claim has been confirmed as a win.
struct ClaimGuard {
    registry: Arc<DateOutcomeRegistry>,
    date: NaiveDate,
    worker: WorkerId,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.registry.reset(self.date, self.worker);
    }
}

pub(crate) struct Worker {
    id: WorkerId,
    target: Target,
    ctx: WorkerContext,
    state: WorkerState,
}

impl Worker {
    pub fn new(id: WorkerId, target: Target, ctx: WorkerContext) -> Self {
        Self {
            id,
            target,
            ctx,
            state: WorkerState::new(),
        }
    }

    fn date(&self) -> NaiveDate {
        self.target.date()
    }

    /// Drive the target to a terminal state. Produces exactly one result.
    #[instrument(
        name = "worker",
        skip_all,
        fields(worker_id = %self.id, source = %self.target.source(), date = %self.target.date())
    )]
    pub async fn run(mut self) -> RunResult {
        info!(timeslots = self.target.timeslots().len(), "▶️  Worker started");

        let exit = self.run_loop().await;
        self.release_session().await;

        let finished_at = self.ctx.clock.now();
        let (result, outcome) = match exit {
            Exit::Won(timeslot) => (
                RunResult::won(self.target.clone(), self.id, timeslot.clone(), finished_at),
                Outcome::Won {
                    date: self.date(),
                    source: self.target.source().clone(),
                    timeslot,
                },
            ),
            Exit::Stopped(reason) => (
                RunResult::stopped(self.target.clone(), Some(self.id), reason, finished_at),
                Outcome::Lost {
                    date: self.date(),
                    source: self.target.source().clone(),
                },
            ),
        };

        self.emit(SchedulerEvent::Outcome(outcome));
        info!(reason = ?result.reason, succeeded = result.succeeded, "⏹️  Worker finished");
        result
    }

    async fn run_loop(&mut self) -> Exit {
        if self.target.timeslots().is_empty() {
            warn!("No timeslots configured, nothing to do");
            return Exit::Stopped(StopReason::Exhausted);
        }

        let call_budget = self.call_budget();

        loop {
            if let Some(reason) = self.stop_reason() {
                return Exit::Stopped(reason);
            }

            let wall = self.ctx.clock.now();
            let mono = Instant::now();
            let drift = self.state.wall_drift(wall, mono, call_budget);
            self.state.touch(wall, mono);

            if drift > self.ctx.config.suspend_threshold {
                warn!(
                    drift_secs = drift.as_secs(),
                    "💤 Host suspend detected, discarding session"
                );
                self.discard_session().await;
                if let Some(exit) = self.on_failure(FailureKind::HostSuspend).await {
                    return exit;
                }
                continue;
            }

            let window = *self.ctx.window.borrow_and_update();
            if !window.is_open(wall) {
                if let Some(exit) = self.wait_for_window(window.until_open(wall)).await {
                    return exit;
                }
                continue;
            }

            if let Err(e) = self.ensure_session().await {
                warn!("Failed to open session: {}", e.format_with_code());
                if let Some(exit) = self.on_failure(FailureKind::SessionBroken).await {
                    return exit;
                }
                continue;
            }

            match self.sweep().await {
                Sweep::Won(timeslot) => return Exit::Won(timeslot),
                Sweep::Stop(reason) => return Exit::Stopped(reason),
                Sweep::Failed(e) => {
                    let kind = e.kind();
                    warn!(
                        %kind,
                        phase = ?self.state.phase,
                        "Slot call failed: {}",
                        e.format_with_code()
                    );
                    if kind != FailureKind::TransientProbe {
                        self.discard_session().await;
                    }
                    if let Some(exit) = self.on_failure(kind).await {
                        return exit;
                    }
                }
                Sweep::Idle => {
                    self.state.record_success();
                    self.state.phase = Phase::Idle;
                    if let Some(exit) = self.pause(self.ctx.config.polling_interval).await {
                        return exit;
                    }
                }
            }
        }
    }

    /// Upper bound on time spent in collaborator calls during one loop
    /// iteration: healthcheck, open and two closes, plus probe, acquire and
    /// confirm for every timeslot.
    fn call_budget(&self) -> Duration {
        let calls = 4 + 3 * self.target.timeslots().len() as u32;
        self.ctx.config.call_timeout.saturating_mul(calls)
    }

    fn stop_reason(&self) -> Option<StopReason> {
        if self.ctx.registry.is_won_by_peer(self.date(), self.id) {
            Some(StopReason::PeerWon)
        } else if self.ctx.cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else {
            None
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        // The dispatcher outlives every worker unless the run was torn down
        let _ = self.ctx.events.send(event);
    }

    /// Sleep, waking early on cancellation or when the date is won.
    async fn pause(&mut self, delay: Duration) -> Option<Exit> {
        self.state.plan_wait(delay);
        tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => Some(Exit::Stopped(StopReason::Cancelled)),
            _ = self.ctx.date_won.cancelled() => None,
            _ = tokio::time::sleep(delay) => None,
        }
    }

    /// Sleep until the window opens or its configuration changes.
    async fn wait_for_window(&mut self, until_open: Duration) -> Option<Exit> {
        self.state.phase = Phase::Gated;
        info!(
            until_open_secs = until_open.as_secs(),
            "🌙 Outside monitoring window, waiting"
        );
        self.emit(SchedulerEvent::WindowGated {
            target: self.target.clone(),
            until_open,
        });

        // An idle browser across a long gate is likely stale afterwards
        if until_open > self.ctx.config.suspend_threshold {
            self.discard_session().await;
        }
        self.state.plan_wait(until_open);

        let window = &mut self.ctx.window;
        let updated = async {
            if window.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => Some(Exit::Stopped(StopReason::Cancelled)),
            _ = self.ctx.date_won.cancelled() => None,
            _ = updated => {
                debug!("Monitoring window updated");
                None
            }
            _ = tokio::time::sleep(until_open) => None,
        }
    }

    /// Count a failure, report it and back off. Returns an exit when the
    /// policy gives up or the backoff was interrupted by cancellation.
    async fn on_failure(&mut self, kind: FailureKind) -> Option<Exit> {
        let attempt = self.state.record_failure();
        self.emit(SchedulerEvent::WorkerFailure {
            target: self.target.clone(),
            kind,
            attempt,
        });

        match self.ctx.config.retry.decide(attempt, kind) {
            RetryDecision::GiveUp => {
                error!(%kind, attempt, "❌ Giving up after repeated failures");
                Some(Exit::Stopped(StopReason::GaveUp))
            }
            RetryDecision::Retry { delay } => {
                self.state.phase = Phase::Backoff;
                info!(%kind, attempt, delay_secs = delay.as_secs(), "Backing off");
                self.pause(delay).await
            }
        }
    }

    /// Make sure a healthy session is open, replacing one that failed its
    /// healthcheck.
    async fn ensure_session(&mut self) -> Result<(), SlotError> {
        let limit = self.ctx.config.call_timeout;

        if let Some(session) = self.state.session.as_mut() {
            let healthy = tokio::time::timeout(limit, session.healthcheck())
                .await
                .unwrap_or(false);
            if healthy {
                return Ok(());
            }
            warn!("Session failed healthcheck, reopening");
            self.discard_session().await;
        }

        self.state.phase = Phase::Recovering;
        let opening = with_timeout(limit, "session open", self.ctx.factory.open(self.target.source()));
        let session = tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => return Ok(()),
            opened = opening => opened?,
        };

        info!("🔌 Session opened");
        self.state.session = Some(session);
        Ok(())
    }

    async fn discard_session(&mut self) {
        if let Some(mut session) = self.state.session.take() {
            if tokio::time::timeout(self.ctx.config.call_timeout, session.close())
                .await
                .is_err()
            {
                warn!("Session close timed out");
            }
        }
    }

    async fn release_session(&mut self) {
        if self.state.session.is_some() {
            self.discard_session().await;
            debug!("Session released");
        }
    }

    /// One pass over the timeslots in configured order.
    async fn sweep(&mut self) -> Sweep {
        let date = self.date();
        let limit = self.ctx.config.call_timeout;
        let timeslots = self.target.timeslots().to_vec();

        for timeslot in timeslots {
            if let Some(reason) = self.stop_reason() {
                return Sweep::Stop(reason);
            }
            if self.ctx.registry.is_claimed_by_peer(date, self.id) {
                debug!("Peer is mid-acquisition, waiting for the next tick");
                return Sweep::Idle;
            }

            let Some(session) = self.state.session.as_mut() else {
                return Sweep::Failed(SlotError::SessionBroken("no open session".to_string()));
            };

            self.state.phase = Phase::Probing;
            let probing = with_timeout(limit, "probe", session.probe(date, &timeslot));
            let probed = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => return Sweep::Stop(StopReason::Cancelled),
                probed = probing => probed,
            };

            match probed {
                Err(e) => return Sweep::Failed(e),
                Ok(ProbeOutcome::Unavailable) => {
                    debug!(%timeslot, "Unavailable");
                    continue;
                }
                Ok(ProbeOutcome::Available) => {
                    info!(%timeslot, "✨ Slot available");
                }
            }

            if !self.ctx.registry.try_claim(date, self.id) {
                if self.ctx.registry.is_won_by_peer(date, self.id) {
                    return Sweep::Stop(StopReason::PeerWon);
                }
                debug!(%timeslot, "Claim denied, peer is mid-acquisition");
                return Sweep::Idle;
            }

            match self.attempt(date, &timeslot).await {
                Ok(true) => return Sweep::Won(timeslot),
                Ok(false) => continue,
                Err(e) => return Sweep::Failed(e),
            }
        }

        Sweep::Idle
    }

    /// Acquire and confirm a claimed timeslot. The claim is released on
    /// every path that does not end in a confirmed win.
    async fn attempt(&mut self, date: NaiveDate, timeslot: &Timeslot) -> Result<bool, SlotError> {
        let _claim = ClaimGuard {
            registry: Arc::clone(&self.ctx.registry),
            date,
            worker: self.id,
        };

        if !self.acquire_and_confirm(date, timeslot).await? {
            return Ok(false);
        }

        let winner = Winner {
            source: self.target.source().clone(),
            timeslot: timeslot.clone(),
            worker: Some(self.id),
        };
        if self.ctx.registry.confirm_win(date, self.id, winner) {
            self.ctx.date_won.cancel();
            info!(%timeslot, "✅ Reservation confirmed");
            Ok(true)
        } else {
            error!(%timeslot, "Lost claim before confirmation could be recorded");
            Ok(false)
        }
    }

    async fn acquire_and_confirm(
        &mut self,
        date: NaiveDate,
        timeslot: &Timeslot,
    ) -> Result<bool, SlotError> {
        let limit = self.ctx.config.call_timeout;
        let Some(session) = self.state.session.as_mut() else {
            return Err(SlotError::SessionBroken("no open session".to_string()));
        };

        self.state.phase = Phase::Acquiring;
        let acquired = with_timeout(limit, "acquire", session.acquire(date, timeslot)).await?;
        if let AcquireResult {
            claimed: false,
            diagnostic,
        } = acquired
        {
            info!(
                %timeslot,
                diagnostic = diagnostic.as_deref().unwrap_or("none"),
                "Acquire rejected, treating slot as unavailable"
            );
            return Ok(false);
        }

        self.state.phase = Phase::Confirming;
        let reservation = Reservation {
            source: self.target.source().clone(),
            date,
            timeslot: timeslot.clone(),
            contact: self.ctx.config.contact.clone(),
        };

        match with_timeout(limit, "confirm", session.confirm(&reservation)).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(%timeslot, "Confirmation rejected, moving to next timeslot");
                Ok(false)
            }
            Err(e) if e.kind() == FailureKind::SessionBroken => Err(e),
            Err(e) => {
                warn!(%timeslot, "Confirmation failed, moving to next timeslot: {}", e);
                Ok(false)
            }
        }
    }
}
