mod timeouts;

pub use timeouts::TimeoutConfig;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use slotwatch_domain::schedule::{
    ConfigError, MonitoringWindow, PoolConfig, ReservationContact, RetryPolicy, SchedulerConfig,
};
use slotwatch_domain::{SourceId, Target, Timeslot};

pub const CONFIG_FILE_NAME: &str = "slotwatch.json";

/// Days ahead of today used when no date is configured.
pub const DEFAULT_DAYS_AHEAD: u64 = 7;

/// Per-user data directory holding the configuration, the outcome file and
/// logs. Falls back to the system temp dir.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("slotwatch")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateEntry {
    pub date: NaiveDate,
    #[serde(default)]
    pub timeslots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub ceiling: u32,
    pub transient_delay_secs: u64,
    pub session_delay_secs: u64,
    pub suspend_delay_secs: u64,
    pub max_delay_secs: u64,
    pub give_up_after: Option<u32>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            ceiling: 3,
            transient_delay_secs: 5,
            session_delay_secs: 60,
            suspend_delay_secs: 120,
            max_delay_secs: 600,
            give_up_after: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSection {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
    pub utc_offset_hours: i32,
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: 9,
            end_hour: 20,
            utc_offset_hours: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub floor: usize,
    pub ceiling: Option<usize>,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            floor: 2,
            ceiling: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headed: bool,
    pub proxy_url: Option<String>,
}

/// On-disk configuration (JSON).
///
/// Every field has a default so a partial file is valid input; required
/// values are enforced by [`AppConfig::into_plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sources: Vec<String>,
    pub dates: Vec<DateEntry>,
    pub default_timeslot: Option<String>,
    pub credentials: Option<Credentials>,
    pub reservation: Option<ReservationContact>,
    pub polling_interval_secs: u64,
    pub call_timeout_secs: u64,
    pub grace_timeout_secs: u64,
    pub suspend_threshold_secs: u64,
    pub retry: RetrySection,
    pub monitoring: MonitoringSection,
    pub pool: PoolSection,
    pub browser: BrowserSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            dates: Vec::new(),
            default_timeslot: None,
            credentials: None,
            reservation: None,
            polling_interval_secs: 5,
            call_timeout_secs: 30,
            grace_timeout_secs: 30,
            suspend_threshold_secs: 300,
            retry: RetrySection::default(),
            monitoring: MonitoringSection::default(),
            pool: PoolSection::default(),
            browser: BrowserSection::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), sources = config.sources.len(), "Loaded configuration");
        Ok(config)
    }

    /// Load `slotwatch.json` from `dir`, or fall back to defaults when the
    /// file does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(dir);
        if path.exists() {
            Self::load(&path)
        } else {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE_NAME)
    }

    /// Today's date in the monitoring window's reference offset.
    pub fn today(&self, now: DateTime<Utc>) -> Result<NaiveDate, ConfigError> {
        Ok(now.with_timezone(&self.window()?.offset()).date_naive())
    }

    pub fn window(&self) -> Result<MonitoringWindow, ConfigError> {
        MonitoringWindow::new(
            self.monitoring.enabled,
            self.monitoring.start_hour,
            self.monitoring.end_hour,
            self.monitoring.utc_offset_hours,
        )
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| ConfigError::MissingCredential("credentials".to_string()))?;
        if credentials.username.trim().is_empty() {
            return Err(ConfigError::MissingCredential("username".to_string()));
        }
        if credentials.password.is_empty() {
            return Err(ConfigError::MissingCredential("password".to_string()));
        }
        Ok(credentials.clone())
    }

    /// Validate everything and build the scheduler configuration plus the
    /// `sources x dates` target list.
    pub fn into_plan(self, today: NaiveDate) -> Result<(SchedulerConfig, Vec<Target>), ConfigError> {
        self.credentials()?;

        let contact = self
            .reservation
            .clone()
            .ok_or_else(|| ConfigError::MissingField("reservation".to_string()))?;

        let config = SchedulerConfig {
            polling_interval: Duration::from_secs(self.polling_interval_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            retry: RetryPolicy {
                ceiling: self.retry.ceiling,
                transient_delay: Duration::from_secs(self.retry.transient_delay_secs),
                session_delay: Duration::from_secs(self.retry.session_delay_secs),
                suspend_delay: Duration::from_secs(self.retry.suspend_delay_secs),
                max_delay: Duration::from_secs(self.retry.max_delay_secs),
                give_up_after: self.retry.give_up_after,
            },
            window: self.window()?,
            pool: PoolConfig {
                floor: self.pool.floor,
                ceiling: self.pool.ceiling,
            },
            grace_timeout: Duration::from_secs(self.grace_timeout_secs),
            suspend_threshold: Duration::from_secs(self.suspend_threshold_secs),
            contact,
        };
        config.validate()?;

        let targets = self.targets(today)?;
        Ok((config, targets))
    }

    fn sources(&self) -> Result<Vec<SourceId>, ConfigError> {
        let mut seen = BTreeSet::new();
        let sources: Vec<SourceId> = self
            .sources
            .iter()
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .filter(|raw| seen.insert(raw.to_string()))
            .map(SourceId::from_string)
            .collect();

        if sources.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        Ok(sources)
    }

    fn default_timeslot(&self) -> Result<Option<Timeslot>, ConfigError> {
        self.default_timeslot
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                Timeslot::parse(raw)
                    .map_err(|e| ConfigError::invalid("default_timeslot", e.to_string()))
            })
            .transpose()
    }

    fn dated_timeslots(&self, today: NaiveDate) -> Result<Vec<(NaiveDate, Vec<Timeslot>)>, ConfigError> {
        let default_timeslot = self.default_timeslot()?;
        let fallback = |date: NaiveDate| {
            default_timeslot.clone().map(|slot| vec![slot]).ok_or_else(|| {
                ConfigError::invalid(
                    format!("dates[{}].timeslots", date),
                    "empty and no default_timeslot configured",
                )
            })
        };

        if self.dates.is_empty() {
            let date = today
                .checked_add_days(Days::new(DEFAULT_DAYS_AHEAD))
                .ok_or_else(|| ConfigError::invalid("dates", "default date out of range"))?;
            info!(%date, "No dates configured, targeting one week ahead");
            return Ok(vec![(date, fallback(date)?)]);
        }

        let mut seen = BTreeSet::new();
        let mut dated = Vec::new();
        for entry in &self.dates {
            if entry.date < today {
                warn!(date = %entry.date, "Skipping date in the past");
                continue;
            }
            if !seen.insert(entry.date) {
                warn!(date = %entry.date, "Skipping duplicate date");
                continue;
            }

            let slots = if entry.timeslots.is_empty() {
                fallback(entry.date)?
            } else {
                entry
                    .timeslots
                    .iter()
                    .map(|raw| {
                        Timeslot::parse(raw).map_err(|e| {
                            ConfigError::invalid(format!("dates[{}].timeslots", entry.date), e.to_string())
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            };
            dated.push((entry.date, slots));
        }

        if dated.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        Ok(dated)
    }

    fn targets(&self, today: NaiveDate) -> Result<Vec<Target>, ConfigError> {
        let sources = self.sources()?;
        let dated = self.dated_timeslots(today)?;

        Ok(dated
            .iter()
            .flat_map(|(date, slots)| {
                sources
                    .iter()
                    .map(move |source| Target::new(source.clone(), *date, slots.clone()))
            })
            .collect())
    }
}
