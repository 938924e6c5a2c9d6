mod config;
mod retry;
mod window;

pub use config::{ConfigError, PoolConfig, ReservationContact, SchedulerConfig};
pub use retry::{FailureKind, RetryDecision, RetryPolicy};
pub use window::MonitoringWindow;
