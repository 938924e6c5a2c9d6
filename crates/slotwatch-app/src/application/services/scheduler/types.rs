use std::time::Duration;
use thiserror::Error;

use slotwatch_domain::{ConfigError, DomainError, RunResult};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to load won dates: {}", .0.format_with_code())]
    Resume(DomainError),

    #[error("{abandoned} worker(s) still running at the shutdown deadline")]
    ShutdownDeadlineExceeded { abandoned: usize },
}

/// What a bounded shutdown observed.
#[derive(Debug)]
pub struct ShutdownReport {
    /// One result per target, including abandoned ones (`StopReason::Aborted`)
    pub results: Vec<RunResult>,
    pub abandoned: usize,
    pub deadline_exceeded: bool,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// Surface an overrun as an error instead of a flag.
    pub fn into_result(self) -> Result<Vec<RunResult>, SchedulerError> {
        if self.deadline_exceeded {
            Err(SchedulerError::ShutdownDeadlineExceeded {
                abandoned: self.abandoned,
            })
        } else {
            Ok(self.results)
        }
    }
}
