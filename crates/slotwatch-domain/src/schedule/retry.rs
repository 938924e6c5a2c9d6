use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure categories that feed the retry policy.
///
/// Lost races and failed confirmations are not failures in this sense: a
/// worker simply moves on, so they never reach `RetryPolicy::decide`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A probe or acquire call errored or timed out; the session is still usable
    TransientProbe,
    /// The collaborator session is unusable and must be recreated
    SessionBroken,
    /// The host was suspended; the wall clock jumped past the monotonic clock
    HostSuspend,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::TransientProbe => "transient_probe",
            FailureKind::SessionBroken => "session_broken",
            FailureKind::HostSuspend => "host_suspend",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

/// Maps (consecutive failure count, failure kind) to a delay.
///
/// Up to `ceiling` consecutive failures the kind's base delay applies.
/// Beyond it the worker keeps going in a degraded mode where the delay
/// doubles per extra failure, capped at `max_delay`. A worker only gives up
/// when `give_up_after` is set and exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub ceiling: u32,
    pub transient_delay: Duration,
    pub session_delay: Duration,
    pub suspend_delay: Duration,
    pub max_delay: Duration,
    pub give_up_after: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ceiling: 3,
            transient_delay: Duration::from_secs(5),
            session_delay: Duration::from_secs(60),
            suspend_delay: Duration::from_secs(120),
            max_delay: Duration::from_secs(600),
            give_up_after: None,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::TransientProbe => self.transient_delay,
            FailureKind::SessionBroken => self.session_delay,
            FailureKind::HostSuspend => self.suspend_delay,
        }
    }

    /// `attempt` is the 1-based count of consecutive failures so far.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if let Some(limit) = self.give_up_after {
            if attempt > limit {
                return RetryDecision::GiveUp;
            }
        }

        let base = self.base_delay(kind);
        if attempt <= self.ceiling {
            return RetryDecision::Retry { delay: base };
        }

        let cap = self.max_delay.max(base);
        let exponent = (attempt - self.ceiling).min(16);
        let delay = base.saturating_mul(1u32 << exponent).min(cap);
        RetryDecision::Retry { delay }
    }
}
