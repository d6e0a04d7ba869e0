//! Core data structures for LRAUV processing.
//!
//! Defines the time window, catalog references, validated files, run
//! options and processing statistics used throughout the library.

use crate::error::{LrauvError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

// =============================================================================
// Time Window
// =============================================================================

/// Requested processing window; a missing bound is unbounded on that side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Create a window, rejecting a start after the end
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(LrauvError::configuration(format!(
                    "Start {} is after end {}",
                    s, e
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Window with neither bound
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Group-level containment: the group's dates, taken at midnight UTC,
    /// must lie within the window with inclusive bounds
    pub fn contains_group(&self, start: NaiveDate, end: NaiveDate) -> bool {
        let group_start = midnight(start);
        let group_end = midnight(end);
        self.start.is_none_or(|s| group_start >= s) && self.end.is_none_or(|e| group_end <= e)
    }

    /// File-level containment: the file's coverage must lie strictly inside
    /// the window
    pub fn strictly_contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| start > s) && self.end.is_none_or(|e| end < e)
    }

    /// Year used to template default locations
    pub fn template_year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.start.or(self.end).map(|t| t.year())
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                .unwrap_or_else(|| "unbounded".to_string())
        };
        write!(f, "[{}, {})", show(self.start), show(self.end))
    }
}

/// Midnight UTC of a calendar date
pub fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::default()).and_utc()
}

// =============================================================================
// Catalog References
// =============================================================================

/// A date-bounded collection of mission logs from one deployment segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionGroup {
    pub id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub catalog_url: String,
}

impl MissionGroup {
    /// Create a mission group; a reversed date pair is a crawl defect
    pub fn new(
        id: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        catalog_url: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        if start > end {
            return Err(LrauvError::crawl_defect(
                id,
                format!("start {} is after end {}", start, end),
            ));
        }
        Ok(Self {
            id,
            start,
            end,
            catalog_url: catalog_url.into(),
        })
    }
}

/// One raw mission log reachable through the remote data-access service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub service_url: String,
    pub mission_group_id: String,
}

/// A mirrored log whose time extent has been read and checked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedFile {
    pub service_url: String,
    pub mission_group_id: String,
    pub input_path: PathBuf,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// =============================================================================
// Run Parameters
// =============================================================================

/// Auxiliary navigation options forwarded to the interpolator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Use positions of `<platform>_ac` from the tracking database
    pub use_tracking_db: bool,
    /// Nudge dead reckoned positions to meet the GPS fixes
    pub nudge_to_gps: bool,
}

/// Parameter profile selecting which instrument variables are resampled
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Science and engineering variables
    #[default]
    Scieng,
    /// Science variables only
    Sci,
    /// Engineering variables only
    Eng,
}

impl Profile {
    /// Name embedded in output file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Scieng => "scieng",
            Profile::Sci => "sci",
            Profile::Eng => "eng",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static FREQUENCY_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(\d+)?(L|ms|S|s|T|Min|min|H|h|D|d)$").expect("valid frequency regex")
});

/// Resampling step as an offset alias such as `2S`, `5Min`, `H` or `D`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResampleFrequency(String);

impl ResampleFrequency {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResampleFrequency {
    type Err = LrauvError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match FREQUENCY_RE.captures(trimmed) {
            Some(caps) if caps.get(1).is_none_or(|m| !m.as_str().starts_with('0')) => {
                Ok(Self(trimmed.to_string()))
            }
            _ => Err(LrauvError::configuration(format!(
                "Invalid resample frequency '{}': expected e.g. 2S, 5Min, H or D",
                s
            ))),
        }
    }
}

impl TryFrom<String> for ResampleFrequency {
    type Error = LrauvError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResampleFrequency> for String {
    fn from(value: ResampleFrequency) -> Self {
        value.0
    }
}

impl fmt::Display for ResampleFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Totals reported at the end of a resample run
#[derive(Debug, Clone, Default)]
pub struct ProcessingStats {
    pub platforms_processed: usize,
    pub platforms_failed: usize,
    /// Platforms stopped by a malformed mission group manifest
    pub crawl_defects: usize,
    pub groups_unreachable: usize,
    pub datasets_discovered: usize,
    pub files_validated: usize,
    pub validation_failures: usize,
    pub files_produced: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub interrupted: bool,
    pub processing_time: Duration,
}

impl ProcessingStats {
    /// Total number of per-file failures of any kind
    pub fn total_failures(&self) -> usize {
        self.validation_failures + self.files_failed
    }

    /// Whether the run should exit successfully.
    ///
    /// Unreadable files, unreachable catalogs and failed resamples are
    /// reported but don't fail the run; a malformed mission group manifest
    /// or an interrupted run does.
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.crawl_defects == 0
    }
}
