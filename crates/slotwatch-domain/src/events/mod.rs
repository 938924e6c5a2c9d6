use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::schedule::FailureKind;
use crate::shared::SourceId;
use crate::target::{Target, Timeslot};

/// Terminal outcome of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Won {
        date: NaiveDate,
        source: SourceId,
        timeslot: Timeslot,
    },
    Lost {
        date: NaiveDate,
        source: SourceId,
    },
}

impl Outcome {
    pub fn date(&self) -> NaiveDate {
        match self {
            Outcome::Won { date, .. } | Outcome::Lost { date, .. } => *date,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Outcome::Won { .. })
    }
}

/// Everything the scheduler reports to listeners.
///
/// Delivery is at-least-once; consumers deduplicate outcomes by date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    Outcome(Outcome),
    WorkerFailure {
        target: Target,
        kind: FailureKind,
        attempt: u32,
    },
    /// Diagnostic only
    WindowGated {
        target: Target,
        until_open: Duration,
    },
}

impl SchedulerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SchedulerEvent::Outcome(Outcome::Won { .. }) => "outcome_won",
            SchedulerEvent::Outcome(Outcome::Lost { .. }) => "outcome_lost",
            SchedulerEvent::WorkerFailure { .. } => "worker_failure",
            SchedulerEvent::WindowGated { .. } => "window_gated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = Outcome::Won {
            date: NaiveDate::from_ymd_opt(2026, 10, 25).unwrap(),
            source: SourceId::from_string("room-a"),
            timeslot: Timeslot::parse("19:0").unwrap(),
        };
        let json = serde_json::to_value(SchedulerEvent::Outcome(outcome.clone())).unwrap();

        assert_eq!(json["event"], "outcome");
        assert_eq!(json["type"], "won");
        assert_eq!(json["timeslot"], "19:00");
        assert!(outcome.succeeded());
    }
}
