//! CF/udunits time conversion.
//!
//! Converts raw time coordinate values written as `<unit> since <reference>`
//! into absolute instants and back.

use crate::constants::{CANONICAL_EPOCH_UNITS, EPOCH_UNIT_SPELLINGS};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::borrow::Cow;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitsError {
    #[error("unrecognised time units '{0}'")]
    InvalidUnits(String),

    #[error("unrecognised reference time '{0}'")]
    InvalidReference(String),

    #[error("time value {0} is not finite")]
    NonFinite(f64),

    #[error("time value {value} {units} is out of range")]
    OutOfRange { value: f64, units: String },
}

/// Step of a time coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Milliseconds => 0.001,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = UnitsError;

    fn from_str(s: &str) -> Result<Self, UnitsError> {
        match s.to_lowercase().as_str() {
            "milliseconds" | "millisecond" | "msec" | "ms" => Ok(TimeUnit::Milliseconds),
            "seconds" | "second" | "secs" | "sec" | "s" => Ok(TimeUnit::Seconds),
            "minutes" | "minute" | "mins" | "min" => Ok(TimeUnit::Minutes),
            "hours" | "hour" | "hrs" | "hr" | "h" => Ok(TimeUnit::Hours),
            "days" | "day" | "d" => Ok(TimeUnit::Days),
            other => Err(UnitsError::InvalidUnits(other.to_string())),
        }
    }
}

/// Parsed `<unit> since <reference>` units string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub reference: DateTime<Utc>,
}

impl FromStr for TimeUnits {
    type Err = UnitsError;

    fn from_str(s: &str) -> Result<Self, UnitsError> {
        let (unit, reference) = s
            .trim()
            .split_once(" since ")
            .ok_or_else(|| UnitsError::InvalidUnits(s.to_string()))?;
        let unit = unit
            .trim()
            .parse()
            .map_err(|_| UnitsError::InvalidUnits(s.to_string()))?;
        let reference = parse_reference(reference)?;
        Ok(Self { unit, reference })
    }
}

/// Map the known spellings of the Unix epoch to the canonical one
pub fn normalize_units(units: &str) -> Cow<'_, str> {
    if EPOCH_UNIT_SPELLINGS.contains(&units.trim()) {
        Cow::Borrowed(CANONICAL_EPOCH_UNITS)
    } else {
        Cow::Borrowed(units)
    }
}

/// Convert a raw coordinate value into an absolute instant
pub fn to_instant(value: f64, units: &str) -> Result<DateTime<Utc>, UnitsError> {
    if !value.is_finite() {
        return Err(UnitsError::NonFinite(value));
    }
    let parsed: TimeUnits = units.parse()?;
    let millis = value * parsed.unit.seconds() * 1000.0;
    if millis.abs() >= i64::MAX as f64 {
        return Err(UnitsError::OutOfRange {
            value,
            units: units.to_string(),
        });
    }
    TimeDelta::try_milliseconds(millis.round() as i64)
        .and_then(|delta| parsed.reference.checked_add_signed(delta))
        .ok_or_else(|| UnitsError::OutOfRange {
            value,
            units: units.to_string(),
        })
}

/// Convert an absolute instant into a raw coordinate value
pub fn from_instant(instant: DateTime<Utc>, units: &str) -> Result<f64, UnitsError> {
    let parsed: TimeUnits = units.parse()?;
    let delta = instant.signed_duration_since(parsed.reference);
    Ok(delta.num_milliseconds() as f64 / 1000.0 / parsed.unit.seconds())
}

fn parse_reference(reference: &str) -> Result<DateTime<Utc>, UnitsError> {
    let mut text = reference.trim();
    for suffix in [" UTC", " utc", "Z", "z"] {
        if let Some(stripped) = text.strip_suffix(suffix) {
            text = stripped.trim_end();
            break;
        }
    }
    let text = text.replace('/', "-").replacen('T', " ", 1);

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&text, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| UnitsError::InvalidReference(reference.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_epoch_spellings_resolve_to_same_instant() {
        let value = 1_347_152_796.5;
        let dashed = to_instant(value, &normalize_units("seconds since 1970-01-01T00:00:00Z"));
        let slashed = to_instant(value, &normalize_units("seconds since 1970/01/01 00:00:00Z"));
        assert_eq!(dashed.unwrap(), slashed.unwrap());
    }

    #[test]
    fn test_normalize_units_leaves_other_units_alone() {
        assert_eq!(
            normalize_units("seconds since 1970-01-01T00:00:00Z"),
            CANONICAL_EPOCH_UNITS
        );
        assert_eq!(
            normalize_units("days since 2000-01-01"),
            "days since 2000-01-01"
        );
    }

    #[test]
    fn test_to_instant_units() {
        let expected = Utc.with_ymd_and_hms(2012, 9, 9, 0, 0, 0).unwrap();
        assert_eq!(
            to_instant(1_347_148_800.0, CANONICAL_EPOCH_UNITS).unwrap(),
            expected
        );
        assert_eq!(
            to_instant(1.0, "days since 2012-09-08 00:00:00").unwrap(),
            expected
        );
        assert_eq!(to_instant(24.0, "hours since 2012-09-08").unwrap(), expected);
    }

    #[test]
    fn test_round_trip_through_units() {
        let instant = Utc.with_ymd_and_hms(2015, 10, 1, 12, 30, 0).unwrap();
        let raw = from_instant(instant, CANONICAL_EPOCH_UNITS).unwrap();
        assert_eq!(to_instant(raw, CANONICAL_EPOCH_UNITS).unwrap(), instant);
    }

    #[test]
    fn test_invalid_units_and_values() {
        assert!(matches!(
            to_instant(0.0, "furlongs since 1970-01-01"),
            Err(UnitsError::InvalidUnits(_))
        ));
        assert!(matches!(
            to_instant(0.0, "seconds"),
            Err(UnitsError::InvalidUnits(_))
        ));
        assert!(matches!(
            to_instant(0.0, "seconds since yesterday"),
            Err(UnitsError::InvalidReference(_))
        ));
        assert!(matches!(
            to_instant(f64::NAN, CANONICAL_EPOCH_UNITS),
            Err(UnitsError::NonFinite(_))
        ));
        assert!(to_instant(1e300, CANONICAL_EPOCH_UNITS).is_err());
    }
}
