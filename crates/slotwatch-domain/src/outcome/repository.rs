use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::{DomainError, SourceId};
use crate::target::Timeslot;

/// Durable record of a confirmed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WonRecord {
    pub date: NaiveDate,
    pub source: SourceId,
    pub timeslot: Timeslot,
    pub won_at: DateTime<Utc>,
}

/// Persistence for won dates, used to resume across process restarts.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn load_won(&self) -> Result<Vec<WonRecord>, DomainError>;

    /// Record a win. Recording the same date twice keeps the first record.
    async fn record_won(&self, record: &WonRecord) -> Result<(), DomainError>;

    /// Drop records for dates before `date`. Returns how many were removed.
    async fn prune_before(&self, date: NaiveDate) -> Result<usize, DomainError>;
}
