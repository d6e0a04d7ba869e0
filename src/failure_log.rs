//! Per-run failure recording.
//!
//! Every file that can't be validated or resampled produces one
//! [`FailureRecord`]. Records are kept for the run summary and written to a
//! `.log` file beside the expected output so the data file audit can detect
//! outputs that were never produced.

use crate::constants::MIRROR_PATH_SEGMENTS;
use crate::processor::OutputNaming;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Why a file was dropped from the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    MirrorUnreadable,
    MissingTimeAxis,
    UnparsableUnits,
    UnparsableTime,
    ReversedTimeAxis,
    TypeMismatch,
    IndexOutOfRange,
    MissingParameter,
    TransformFailed,
}

impl FailureKind {
    /// Whether the failure happened before resampling was attempted
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FailureKind::MirrorUnreadable
                | FailureKind::MissingTimeAxis
                | FailureKind::UnparsableUnits
                | FailureKind::UnparsableTime
                | FailureKind::ReversedTimeAxis
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::MirrorUnreadable => "mirror unreadable",
            FailureKind::MissingTimeAxis => "missing time axis",
            FailureKind::UnparsableUnits => "unparsable time units",
            FailureKind::UnparsableTime => "unparsable time values",
            FailureKind::ReversedTimeAxis => "reversed time axis",
            FailureKind::TypeMismatch => "invalid data",
            FailureKind::IndexOutOfRange => "interpolation index out of range",
            FailureKind::MissingParameter => "missing parameter",
            FailureKind::TransformFailed => "resampling failed",
        };
        f.write_str(label)
    }
}

/// A file dropped from the run, keyed by its service URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub service_url: String,
    pub kind: FailureKind,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(
        service_url: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service_url: service_url.into(),
            kind,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Line written to the audit log
    pub fn log_line(&self) -> String {
        format!(
            "WARNING {}Z {}: {} ({})\n",
            self.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.message,
            self.service_url
        )
    }
}

/// Map a service URL onto the local mirror: its trailing, percent-decoded
/// path segments appended to the mirror root. Text that isn't an absolute
/// URL is split as a plain path.
pub fn mirror_path(mirror_root: &Path, service_url: &str) -> PathBuf {
    let segments: Vec<String> = match Url::parse(service_url) {
        Ok(url) => url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default(),
        Err(_) => service_url
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    };
    let tail = &segments[segments.len().saturating_sub(MIRROR_PATH_SEGMENTS)..];
    tail.iter()
        .fold(mirror_root.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Collects the failures of one run and writes their audit logs
#[derive(Debug)]
pub struct FailureLog {
    mirror_root: PathBuf,
    naming: OutputNaming,
    write_files: bool,
    records: Vec<FailureRecord>,
}

impl FailureLog {
    pub fn new(mirror_root: impl Into<PathBuf>, naming: OutputNaming) -> Self {
        Self {
            mirror_root: mirror_root.into(),
            naming,
            write_files: true,
            records: Vec::new(),
        }
    }

    /// Keep records in memory only
    pub fn without_files(mut self) -> Self {
        self.write_files = false;
        self
    }

    /// Audit log path for a service URL
    pub fn log_path(&self, service_url: &str) -> PathBuf {
        self.naming
            .log_path(&mirror_path(&self.mirror_root, service_url))
    }

    /// Record a failure, emit it at warn level and write its audit log
    pub fn record(&mut self, record: FailureRecord) {
        warn!("{}: {} ({})", record.kind, record.message, record.service_url);

        if self.write_files {
            let path = self.log_path(&record.service_url);
            match std::fs::write(&path, record.log_line()) {
                Ok(()) => debug!("Wrote failure log {}", path.display()),
                Err(e) => warn!("Can't write failure log {}: {}", path.display(), e),
            }
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of failures recorded before resampling
    pub fn validation_failures(&self) -> usize {
        self.records.iter().filter(|r| r.kind.is_validation()).count()
    }

    pub fn into_records(self) -> Vec<FailureRecord> {
        self.records
    }
}
