use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use slotwatch_domain::SlotSession;

/// Where the worker is in its loop. Only used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Phase {
    Idle,
    Gated,
    Recovering,
    Probing,
    Acquiring,
    Confirming,
    Backoff,
}

/// Point in time recorded on both clocks.
#[derive(Debug, Clone, Copy)]
struct ActivityMark {
    wall: DateTime<Utc>,
    mono: Instant,
}

/// Mutable per-worker state. Never shared with other workers.
pub(super) struct WorkerState {
    pub session: Option<Box<dyn SlotSession>>,
    pub consecutive_failures: u32,
    pub phase: Phase,
    last_activity: Option<ActivityMark>,
    /// Deliberate sleeps since the last activity mark
    planned_wait: Duration,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            session: None,
            consecutive_failures: 0,
            phase: Phase::Idle,
            last_activity: None,
            planned_wait: Duration::ZERO,
        }
    }

    pub fn touch(&mut self, wall: DateTime<Utc>, mono: Instant) {
        self.last_activity = Some(ActivityMark { wall, mono });
        self.planned_wait = Duration::ZERO;
    }

    pub fn plan_wait(&mut self, wait: Duration) {
        self.planned_wait = self.planned_wait.saturating_add(wait);
    }

    /// Wall time since the last activity that neither clock accounts for.
    ///
    /// Where the monotonic clock stops during suspend, the gap is wall time
    /// minus monotonic time. Where it keeps counting (QueryPerformanceCounter
    /// on Windows), the gap is wall time minus planned sleeps and
    /// `call_budget`. The larger of the two is reported.
    pub fn wall_drift(&self, wall: DateTime<Utc>, mono: Instant, call_budget: Duration) -> Duration {
        let Some(mark) = self.last_activity else {
            return Duration::ZERO;
        };
        let wall_elapsed = (wall - mark.wall).to_std().unwrap_or(Duration::ZERO);
        let mono_gap = wall_elapsed.saturating_sub(mono.saturating_duration_since(mark.mono));
        let unplanned = wall_elapsed.saturating_sub(self.planned_wait.saturating_add(call_budget));
        mono_gap.max(unplanned)
    }

    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }
}
