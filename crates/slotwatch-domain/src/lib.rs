// Domain layer - Pure scheduling logic
// No dependencies on infrastructure or application layers

pub mod events;
pub mod outcome;
pub mod schedule;
pub mod session;
pub mod shared;
pub mod target;

// Re-exports for convenience
pub use events::{Outcome, SchedulerEvent};
pub use outcome::{DateOutcome, DateOutcomeRegistry, OutcomeStore, RunResult, StopReason, Winner, WonRecord};
pub use schedule::{
    ConfigError, FailureKind, MonitoringWindow, PoolConfig, ReservationContact, RetryDecision,
    RetryPolicy, SchedulerConfig,
};
pub use session::{AcquireResult, ProbeOutcome, Reservation, SessionFactory, SlotError, SlotSession};
pub use shared::{Clock, DomainError, ErrorCode, RunId, SourceId, SystemClock, WorkerId};
pub use target::{Target, Timeslot, TimeslotParseError};
