//! Timestamp normalization.
//!
//! Every activity start time is reduced to a [`NormalizedInstant`]: a
//! timezone-free UTC wall-clock time truncated to the top of the hour, which is
//! the granularity of the hourly weather source.
//!
//! Offset-aware inputs are converted to UTC. Timezone-naive inputs carry no
//! information about their zone; they are only accepted when the caller states
//! that the field already holds UTC wall-clock time.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde_json::Value;
use std::fmt;

/// Offset-aware formats tried after RFC 3339. A trailing `Z` is rewritten to
/// `+00:00` before matching.
const AWARE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A UTC wall-clock time with minutes, seconds and sub-seconds all zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedInstant(NaiveDateTime);

impl NormalizedInstant {
    /// Truncate a UTC wall-clock time to the start of its hour.
    pub fn from_utc(naive: NaiveDateTime) -> Self {
        Self(floor_to_hour(naive))
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }
}

impl fmt::Display for NormalizedInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S"))
    }
}

/// Why a raw value could not be turned into a [`NormalizedInstant`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("empty timestamp")]
    Empty,
    #[error("unparseable timestamp '{0}'")]
    Unparseable(String),
    #[error("timezone-naive timestamp '{0}' in a field not declared as UTC")]
    NaiveNotUtc(String),
    #[error("unsupported timestamp value {0}")]
    UnsupportedType(String),
}

enum ParsedTime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Normalize a raw field value to the top of its UTC hour.
///
/// `is_already_utc` declares that timezone-naive values in this field are UTC
/// wall-clock times. When false, naive values are rejected rather than guessed.
/// Numbers and all-digit strings are read as Unix epoch seconds.
///
/// The rendered form of a [`NormalizedInstant`] is itself naive UTC, so it
/// normalizes back to the same instant only when declared UTC:
/// `normalize(normalize(t, _).to_string(), true) == normalize(t, _)`.
pub fn normalize(raw: &Value, is_already_utc: bool) -> Result<NormalizedInstant, TimestampError> {
    let parsed = match raw {
        Value::Null => return Err(TimestampError::Empty),
        Value::String(s) => parse_str(s)?,
        Value::Number(n) => parse_epoch(n)?,
        other => return Err(TimestampError::UnsupportedType(other.to_string())),
    };

    let utc = match parsed {
        ParsedTime::Aware(dt) => dt.naive_utc(),
        ParsedTime::Naive(naive) if is_already_utc => naive,
        ParsedTime::Naive(naive) => return Err(TimestampError::NaiveNotUtc(naive.to_string())),
    };

    Ok(NormalizedInstant::from_utc(utc))
}

#[cfg(test)]
pub fn normalize_str(raw: &str, is_already_utc: bool) -> Result<NormalizedInstant, TimestampError> {
    normalize(&Value::String(raw.to_string()), is_already_utc)
}

fn parse_str(raw: &str) -> Result<ParsedTime, TimestampError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(TimestampError::Empty);
    }

    let digits = s.strip_prefix('-').unwrap_or(s);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s
            .parse()
            .map_err(|_| TimestampError::Unparseable(s.to_string()))?;
        return parse_epoch(&secs.into());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(ParsedTime::Aware(dt));
    }

    let zulu_rewritten = s
        .strip_suffix('Z')
        .or_else(|| s.strip_suffix('z'))
        .map(|rest| format!("{}+00:00", rest));
    let aware_input = zulu_rewritten.as_deref().unwrap_or(s);

    for fmt in &AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(aware_input, fmt) {
            return Ok(ParsedTime::Aware(dt));
        }
    }

    for fmt in &NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ParsedTime::Naive(naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Ok(ParsedTime::Naive(date.and_time(NaiveTime::MIN)));
    }

    Err(TimestampError::Unparseable(s.to_string()))
}

fn parse_epoch(n: &serde_json::Number) -> Result<ParsedTime, TimestampError> {
    let dt = if let Some(secs) = n.as_i64() {
        DateTime::from_timestamp(secs, 0)
    } else {
        n.as_f64().filter(|f| f.is_finite()).and_then(|f| {
            let secs = f.floor();
            let nanos = ((f - secs) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(secs as i64, nanos)
        })
    };

    dt.map(|utc| ParsedTime::Aware(utc.fixed_offset()))
        .ok_or_else(|| TimestampError::Unparseable(n.to_string()))
}

/// Floor a datetime to the start of its hour.
fn floor_to_hour(dt: NaiveDateTime) -> NaiveDateTime {
    NaiveTime::from_hms_opt(dt.hour(), 0, 0)
        .map(|t| dt.date().and_time(t))
        .unwrap_or(dt)
}
