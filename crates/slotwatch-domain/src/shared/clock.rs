use chrono::{DateTime, Utc};

/// Wall-clock seam.
///
/// Workers read the wall clock for monitoring-window gating and host-suspend
/// detection; tests substitute a clock they can skew.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
