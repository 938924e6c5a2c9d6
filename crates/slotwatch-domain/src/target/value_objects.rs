use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::SourceId;

/// An externally defined bookable unit within a date, kept as `H:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeslot(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timeslot '{0}': expected H:MM with hour 0-23 and minute 0-59")]
pub struct TimeslotParseError(pub String);

impl Timeslot {
    /// Parse and normalise a timeslot label ("19:0" becomes "19:00").
    pub fn parse(raw: &str) -> Result<Self, TimeslotParseError> {
        let trimmed = raw.trim();
        let (hour, minute) = trimmed
            .split_once(':')
            .ok_or_else(|| TimeslotParseError(raw.to_string()))?;

        let hour: u32 = hour
            .trim()
            .parse()
            .map_err(|_| TimeslotParseError(raw.to_string()))?;
        let minute: u32 = if minute.trim().is_empty() {
            0
        } else {
            minute
                .trim()
                .parse()
                .map_err(|_| TimeslotParseError(raw.to_string()))?
        };

        if hour > 23 || minute > 59 {
            return Err(TimeslotParseError(raw.to_string()));
        }

        Ok(Self(format!("{}:{:02}", hour, minute)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timeslot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Timeslot {
    type Error = TimeslotParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Timeslot::parse(&value)
    }
}

impl From<Timeslot> for String {
    fn from(value: Timeslot) -> Self {
        value.0
    }
}

/// One (source, date, timeslot list) unit of scheduled work.
///
/// Built once from configuration and never mutated. Timeslots are tried in
/// list order, lowest index first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    source: SourceId,
    date: NaiveDate,
    timeslots: Vec<Timeslot>,
}

impl Target {
    pub fn new(source: SourceId, date: NaiveDate, timeslots: Vec<Timeslot>) -> Self {
        Self {
            source,
            date,
            timeslots,
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn timeslots(&self) -> &[Timeslot] {
        &self.timeslots
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.date, self.source)
    }
}
