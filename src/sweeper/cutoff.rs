//! Retention cutoff parsing.
//!
//! A cutoff is an absolute UTC instant. Users usually express it as a
//! retention window relative to now (`"1 week"`, `"30 days ago"`), so both
//! relative and absolute forms are accepted and resolved up front, before the
//! sweep touches the network.

use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;

use super::SweepError;

/// `<count> <unit> [ago]`, e.g. `1 week`, `12h`, `an hour ago`.
static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+|an?)\s*([a-z]+)(?:\s+ago)?$").expect("relative duration pattern is valid")
});

const SECS_PER_DAY: i64 = 86_400;

/// Absolute point in time; resources updated strictly before it are eligible
/// for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetentionCutoff(DateTime<Utc>);

impl RetentionCutoff {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Format used for the `updated_before` query parameter.
    pub fn as_query_param(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Resolve an optional user-supplied cutoff. Absent or blank input is an
    /// error, same as unparsable input.
    pub fn resolve(input: Option<&str>) -> Result<Self, SweepError> {
        Self::resolve_at(input, Utc::now())
    }

    /// Like [`resolve`](Self::resolve), with relative forms measured from `now`.
    pub fn resolve_at(input: Option<&str>, now: DateTime<Utc>) -> Result<Self, SweepError> {
        match input.map(str::trim) {
            Some(value) if !value.is_empty() => Self::parse_at(value, now),
            _ => Err(SweepError::InvalidArgument(
                "no retention cutoff was given".to_string(),
            )),
        }
    }

    /// Parse a cutoff, resolving relative forms against `now`.
    pub fn parse_at(input: &str, now: DateTime<Utc>) -> Result<Self, SweepError> {
        let normalized = input.trim().to_ascii_lowercase();
        let invalid = || {
            SweepError::InvalidArgument(format!(
                "invalid value ({input:?}) for the retention cutoff"
            ))
        };

        match normalized.as_str() {
            "now" => return Ok(Self(now)),
            "today" => return midnight(now.date_naive()).map(Self).ok_or_else(invalid),
            "yesterday" => {
                return now
                    .date_naive()
                    .pred_opt()
                    .and_then(midnight)
                    .map(Self)
                    .ok_or_else(invalid);
            }
            _ => {}
        }

        if let Some(at) = parse_absolute(input.trim()) {
            return Ok(Self(at));
        }

        let caps = RELATIVE.captures(&normalized).ok_or_else(invalid)?;
        let count: i64 = match &caps[1] {
            "a" | "an" => 1,
            digits => digits.parse().map_err(|_| invalid())?,
        };
        let unit = unit_seconds(&caps[2]).ok_or_else(invalid)?;

        count
            .checked_mul(unit)
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| now.checked_sub_signed(delta))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl FromStr for RetentionCutoff {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(Some(s))
    }
}

impl fmt::Display for RetentionCutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_query_param())
    }
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

fn parse_absolute(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(midnight)
}

/// Length of a calendar unit in seconds. Months are 30 days, years 365.
fn unit_seconds(unit: &str) -> Option<i64> {
    let secs = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => SECS_PER_DAY,
        "w" | "wk" | "wks" | "week" | "weeks" => 7 * SECS_PER_DAY,
        "mo" | "mon" | "month" | "months" => 30 * SECS_PER_DAY,
        "y" | "yr" | "yrs" | "year" | "years" => 365 * SECS_PER_DAY,
        _ => return None,
    };
    Some(secs)
}
