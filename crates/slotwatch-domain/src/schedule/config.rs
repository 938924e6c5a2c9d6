use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{MonitoringWindow, RetryPolicy};
use crate::shared::DomainError;

/// Fatal startup problems. Nothing is spawned when one of these surfaces.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("no targets configured")]
    NoTargets,

    #[error("failed to read configuration: {0}")]
    Read(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for DomainError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingCredential(name) => DomainError::MissingCredential(name),
            other => DomainError::InvalidConfiguration(other.to_string()),
        }
    }
}

/// Details submitted with the confirmation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationContact {
    pub name: String,
    pub email: String,
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub floor: usize,
    /// `None` scales with available parallelism
    pub ceiling: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            floor: 2,
            ceiling: None,
        }
    }
}

impl PoolConfig {
    pub fn ceiling_for(&self, parallelism: usize) -> usize {
        self.ceiling
            .unwrap_or_else(|| (parallelism.saturating_mul(2)).max(8))
            .max(1)
    }

    /// `min(max(targets, floor), ceiling)`
    pub fn worker_count(&self, targets: usize, parallelism: usize) -> usize {
        targets.max(self.floor).min(self.ceiling_for(parallelism))
    }
}

/// Immutable configuration shared by the scheduler and every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub polling_interval: Duration,
    /// Applied to every collaborator call
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub window: MonitoringWindow,
    pub pool: PoolConfig,
    pub grace_timeout: Duration,
    /// Wall-clock time a worker cannot account for that counts as a host suspend
    pub suspend_threshold: Duration,
    pub contact: ReservationContact,
}

impl SchedulerConfig {
    pub const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(contact: ReservationContact) -> Self {
        Self {
            polling_interval: Duration::from_secs(5),
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            window: MonitoringWindow::default(),
            pool: PoolConfig::default(),
            grace_timeout: Duration::from_secs(30),
            suspend_threshold: Duration::from_secs(300),
            contact,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling_interval < Self::MIN_POLLING_INTERVAL {
            return Err(ConfigError::invalid(
                "polling_interval",
                "must be at least 1 second",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::invalid("call_timeout", "must be positive"));
        }
        if self.suspend_threshold.is_zero() {
            return Err(ConfigError::invalid("suspend_threshold", "must be positive"));
        }
        if self.pool.floor == 0 {
            return Err(ConfigError::invalid("pool.floor", "must be at least 1"));
        }
        if self.pool.ceiling == Some(0) {
            return Err(ConfigError::invalid("pool.ceiling", "must be at least 1"));
        }
        if self.contact.name.trim().is_empty() {
            return Err(ConfigError::MissingField("reservation.name".to_string()));
        }
        if self.contact.email.trim().is_empty() {
            return Err(ConfigError::MissingField("reservation.email".to_string()));
        }
        Ok(())
    }
}
