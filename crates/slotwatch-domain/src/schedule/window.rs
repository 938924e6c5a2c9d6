use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Offset, Timelike, Utc};
use std::time::Duration;

use super::ConfigError;

/// Daily time-of-day range during which polling is permitted.
///
/// Hours are interpreted in a fixed reference offset. `[start, end)` wraps
/// around midnight when `end < start`; `start == end` means open all day.
/// Pure: every query takes the current time as an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoringWindow {
    enabled: bool,
    start_hour: u32,
    end_hour: u32,
    utc_offset_secs: i32,
}

impl MonitoringWindow {
    pub fn new(
        enabled: bool,
        start_hour: u32,
        end_hour: u32,
        utc_offset_hours: i32,
    ) -> Result<Self, ConfigError> {
        if start_hour > 23 {
            return Err(ConfigError::invalid("monitoring.start_hour", "must be 0-23"));
        }
        if end_hour > 23 {
            return Err(ConfigError::invalid("monitoring.end_hour", "must be 0-23"));
        }
        let utc_offset_secs = utc_offset_hours * 3600;
        if FixedOffset::east_opt(utc_offset_secs).is_none() {
            return Err(ConfigError::invalid(
                "monitoring.utc_offset_hours",
                "must be between -23 and +23",
            ));
        }

        Ok(Self {
            enabled,
            start_hour,
            end_hour,
            utc_offset_secs,
        })
    }

    /// A disabled window: polling is always permitted.
    pub fn always_open() -> Self {
        Self {
            enabled: false,
            start_hour: 0,
            end_hour: 0,
            utc_offset_secs: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix())
    }

    /// The wraparound rule on a bare hour of day.
    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour == self.end_hour {
            true
        } else if self.end_hour < self.start_hour {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            hour >= self.start_hour && hour < self.end_hour
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        self.contains_hour(now.with_timezone(&self.offset()).hour())
    }

    /// Time until polling is next permitted; zero when already open.
    ///
    /// The result lands exactly on the next start boundary, so
    /// `is_open(now + until_open(now))` holds.
    pub fn until_open(&self, now: DateTime<Utc>) -> Duration {
        if self.is_open(now) {
            return Duration::ZERO;
        }

        let offset = self.offset();
        let local = now.with_timezone(&offset);
        let next_start = local
            .date_naive()
            .and_hms_opt(self.start_hour, 0, 0)
            .and_then(|dt| dt.and_local_timezone(offset).single())
            .map(|start| {
                if start <= local {
                    start + ChronoDuration::days(1)
                } else {
                    start
                }
            });

        match next_start {
            Some(start) => (start - local).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }
}

impl Default for MonitoringWindow {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: 9,
            end_hour: 20,
            utc_offset_secs: 9 * 3600,
        }
    }
}
