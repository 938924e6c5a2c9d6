use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use slotwatch_domain::outcome::{OutcomeStore, WonRecord};
use slotwatch_domain::DomainError;

/// Process-local store, for tests and runs that need no resume.
#[derive(Default)]
pub struct InMemoryOutcomeStore {
    records: RwLock<BTreeMap<NaiveDate, WonRecord>>,
}

impl InMemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = WonRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.date, r)).collect()),
        }
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn load_won(&self) -> Result<Vec<WonRecord>, DomainError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn record_won(&self, record: &WonRecord) -> Result<(), DomainError> {
        self.records
            .write()
            .await
            .entry(record.date)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn prune_before(&self, date: NaiveDate) -> Result<usize, DomainError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|d, _| *d >= date);
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use slotwatch_domain::{SourceId, Timeslot};

    fn record(day: u32, source: &str) -> WonRecord {
        WonRecord {
            date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            source: SourceId::from_string(source),
            timeslot: Timeslot::parse("19:00").unwrap(),
            won_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_first_record_wins() {
        let store = InMemoryOutcomeStore::new();
        store.record_won(&record(25, "room-a")).await.unwrap();
        store.record_won(&record(25, "room-b")).await.unwrap();

        let records = store.load_won().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source.as_str(), "room-a");
    }

    #[tokio::test]
    async fn test_prune_before() {
        let store = InMemoryOutcomeStore::with_records([record(10, "a"), record(20, "a"), record(30, "a")]);
        let removed = store
            .prune_before(NaiveDate::from_ymd_opt(2026, 10, 20).unwrap())
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.load_won().await.unwrap().len(), 2);
    }
}
