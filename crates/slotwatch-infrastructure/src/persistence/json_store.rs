use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use slotwatch_domain::outcome::{OutcomeStore, WonRecord};
use slotwatch_domain::DomainError;

pub const OUTCOME_FILE_NAME: &str = "completed-reservations.json";

/// Won dates persisted as a JSON array, one record per date.
///
/// Writes go to a sibling temp file that is then renamed over the original,
/// so a crash never leaves a half-written file behind.
pub struct JsonOutcomeStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonOutcomeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(OUTCOME_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<WonRecord>, DomainError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DomainError::Repository(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            DomainError::Serialization(format!("{}: {}", self.path.display(), e))
        })
    }

    async fn write_all(&self, records: &[WonRecord]) -> Result<(), DomainError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Repository(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| DomainError::Repository(format!("failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| DomainError::Repository(format!("failed to replace {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl OutcomeStore for JsonOutcomeStore {
    async fn load_won(&self) -> Result<Vec<WonRecord>, DomainError> {
        let records = self.read_all().await?;
        debug!(path = %self.path.display(), count = records.len(), "Loaded won dates");
        Ok(records)
    }

    async fn record_won(&self, record: &WonRecord) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read_all().await?;
        if records.iter().any(|existing| existing.date == record.date) {
            debug!(date = %record.date, "Date already recorded, keeping first record");
            return Ok(());
        }

        records.push(record.clone());
        records.sort_by_key(|r| r.date);
        self.write_all(&records).await?;

        info!(
            date = %record.date,
            source = %record.source,
            timeslot = %record.timeslot,
            "Recorded won reservation"
        );
        Ok(())
    }

    async fn prune_before(&self, date: NaiveDate) -> Result<usize, DomainError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read_all().await?;
        let before = records.len();
        records.retain(|r| r.date >= date);
        let removed = before - records.len();

        if removed > 0 {
            self.write_all(&records).await?;
            info!(removed, cutoff = %date, "Pruned past reservations");
        }
        Ok(removed)
    }
}
