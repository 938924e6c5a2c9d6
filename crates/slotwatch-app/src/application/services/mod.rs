mod scheduler;
mod worker;

pub use scheduler::{SchedulerError, SchedulerHandle, ShutdownReport, SlotScheduler};
