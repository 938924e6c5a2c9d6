// Application layer - scheduler, workers and event fan-out
// Wires domain seams to infrastructure implementations

pub mod application;
pub mod bootstrap;

pub use application::events::{EventDispatcher, LoggingListener, OutcomeListener, RecordingListener};
pub use application::services::{
    SchedulerError, SchedulerHandle, ShutdownReport, SlotScheduler,
};
