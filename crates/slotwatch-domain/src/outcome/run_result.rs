use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::WorkerId;
use crate::target::{Target, Timeslot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// This worker confirmed a slot.
    Won,
    /// Another worker confirmed a slot for the same date.
    PeerWon,
    /// The date was already won in an earlier run; no worker was started.
    AlreadyWon,
    /// Cooperative cancellation from the scheduler.
    Cancelled,
    /// The target had no timeslots to try.
    Exhausted,
    /// The retry policy was configured to give up and did.
    GaveUp,
    /// The worker was abandoned at the shutdown deadline or panicked.
    Aborted,
}

/// Terminal record of one target, produced exactly once when its worker exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub target: Target,
    pub worker: Option<WorkerId>,
    pub succeeded: bool,
    pub timeslot: Option<Timeslot>,
    pub reason: StopReason,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn won(
        target: Target,
        worker: WorkerId,
        timeslot: Timeslot,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target,
            worker: Some(worker),
            succeeded: true,
            timeslot: Some(timeslot),
            reason: StopReason::Won,
            finished_at,
        }
    }

    pub fn stopped(
        target: Target,
        worker: Option<WorkerId>,
        reason: StopReason,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            target,
            worker,
            succeeded: false,
            timeslot: None,
            reason,
            finished_at,
        }
    }
}
