use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::schedule::{FailureKind, ReservationContact};
use crate::shared::{ErrorCode, SourceId};
use crate::target::Timeslot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireResult {
    pub claimed: bool,
    pub diagnostic: Option<String>,
}

impl AcquireResult {
    pub fn claimed() -> Self {
        Self {
            claimed: true,
            diagnostic: None,
        }
    }

    pub fn rejected(diagnostic: impl Into<String>) -> Self {
        Self {
            claimed: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Everything the confirmation step submits for an acquired slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub source: SourceId,
    pub date: NaiveDate,
    pub timeslot: Timeslot,
    pub contact: ReservationContact,
}

/// Failure of a collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// Network hiccup, element not ready; the session stays usable
    #[error("transient failure: {0}")]
    Transient(String),

    /// Resource unreachable or connection dropped
    #[error("session broken: {0}")]
    SessionBroken(String),

    #[error("{operation} timed out after {}s", after.as_secs_f64())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl SlotError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SlotError::Transient(_) | SlotError::Timeout { .. } => FailureKind::TransientProbe,
            SlotError::SessionBroken(_) => FailureKind::SessionBroken,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SlotError::Transient(_) => ErrorCode::ProbeFailed,
            SlotError::SessionBroken(_) => ErrorCode::SessionBroken,
            SlotError::Timeout { .. } => ErrorCode::TimeoutError,
        }
    }

    pub fn format_with_code(&self) -> String {
        format!("[{}] {}", self.code().code(), self)
    }
}

/// One long-lived connection to a source, owned by exactly one worker.
///
/// Implementations perform the document-level work; callers wrap every
/// call in their own timeout.
#[async_trait]
pub trait SlotSession: Send + Sync {
    async fn healthcheck(&mut self) -> bool;

    async fn probe(
        &mut self,
        date: NaiveDate,
        timeslot: &Timeslot,
    ) -> Result<ProbeOutcome, SlotError>;

    async fn acquire(
        &mut self,
        date: NaiveDate,
        timeslot: &Timeslot,
    ) -> Result<AcquireResult, SlotError>;

    /// Submit reservation details for an acquired slot. `Ok(false)` means
    /// the collaborator did not accept the confirmation.
    async fn confirm(&mut self, reservation: &Reservation) -> Result<bool, SlotError>;

    /// Best-effort release of the underlying resource.
    async fn close(&mut self);
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, source: &SourceId) -> Result<Box<dyn SlotSession>, SlotError>;
}
