//! Candidate validation.
//!
//! Maps each discovered log onto the local mirror, reads the bounds of its
//! time coordinate and keeps the files whose coverage lies strictly inside
//! the requested window. Unreadable files are recorded and dropped; they
//! never stop the run.

use crate::constants::DEFAULT_TIME_AXIS;
use crate::failure_log::{FailureKind, FailureLog, FailureRecord, mirror_path};
use crate::models::{DatasetRef, TimeWindow, ValidatedFile};
use crate::reader::{ReadError, TimeAxisReader};
use crate::units::{UnitsError, normalize_units, to_instant};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Units(#[from] UnitsError),

    #[error("time axis runs backwards: starts {start}, ends {end}")]
    Reversed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("validation task failed: {0}")]
    Task(String),
}

impl ValidationError {
    /// Failure classification for the audit log
    pub fn kind(&self) -> FailureKind {
        match self {
            ValidationError::Read(ReadError::Open { .. }) | ValidationError::Task(_) => {
                FailureKind::MirrorUnreadable
            }
            ValidationError::Read(ReadError::MissingAxis { .. })
            | ValidationError::Read(ReadError::MissingUnits { .. }) => FailureKind::MissingTimeAxis,
            ValidationError::Read(ReadError::Empty { .. })
            | ValidationError::Read(ReadError::Values { .. }) => FailureKind::UnparsableTime,
            ValidationError::Units(UnitsError::InvalidUnits(_))
            | ValidationError::Units(UnitsError::InvalidReference(_)) => {
                FailureKind::UnparsableUnits
            }
            ValidationError::Units(_) => FailureKind::UnparsableTime,
            ValidationError::Reversed { .. } => FailureKind::ReversedTimeAxis,
        }
    }
}

/// Read a mirrored file's coverage
pub fn read_coverage<R: TimeAxisReader + ?Sized>(
    reader: &R,
    path: &Path,
    axis: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ValidationError> {
    let time_axis = reader.read_time_axis(path, axis)?;
    let units = normalize_units(&time_axis.units);
    let start = to_instant(time_axis.first, &units)?;
    let end = to_instant(time_axis.last, &units)?;
    if start > end {
        return Err(ValidationError::Reversed { start, end });
    }
    Ok((start, end))
}

/// Validates discovered logs against the local mirror
#[derive(Debug)]
pub struct CandidateValidator<R> {
    reader: Arc<R>,
    mirror_root: PathBuf,
    time_axis: String,
    concurrency: usize,
}

impl<R: TimeAxisReader> CandidateValidator<R> {
    pub fn new(reader: R, mirror_root: impl Into<PathBuf>) -> Self {
        Self::shared(Arc::new(reader), mirror_root)
    }

    /// Validator over a reader shared between platforms
    pub fn shared(reader: Arc<R>, mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            mirror_root: mirror_root.into(),
            time_axis: DEFAULT_TIME_AXIS.to_string(),
            concurrency: num_cpus::get(),
        }
    }

    pub fn with_time_axis(mut self, axis: impl Into<String>) -> Self {
        self.time_axis = axis.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn check(&self, dataset: &DatasetRef) -> Result<ValidatedFile, ValidationError> {
        let input_path = mirror_path(&self.mirror_root, &dataset.service_url);
        let reader = Arc::clone(&self.reader);
        let axis = self.time_axis.clone();
        let path = input_path.clone();

        let (start, end) =
            task::spawn_blocking(move || read_coverage(reader.as_ref(), &path, &axis))
                .await
                .map_err(|e| ValidationError::Task(e.to_string()))??;

        Ok(ValidatedFile {
            service_url: dataset.service_url.clone(),
            mission_group_id: dataset.mission_group_id.clone(),
            input_path,
            start,
            end,
        })
    }

    /// Validate discovered logs, recording every unreadable file.
    ///
    /// Files outside the window are dropped without a failure record.
    pub async fn validate(
        &self,
        datasets: &[DatasetRef],
        window: &TimeWindow,
        failures: &mut FailureLog,
    ) -> Vec<ValidatedFile> {
        let results: Vec<_> = stream::iter(datasets)
            .map(|dataset| async move { (dataset, self.check(dataset).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut validated = Vec::new();
        for (dataset, result) in results {
            match result {
                Ok(file) if window.strictly_contains(file.start, file.end) => {
                    debug!(
                        "{} covers {} to {}",
                        file.input_path.display(),
                        file.start,
                        file.end
                    );
                    validated.push(file);
                }
                Ok(file) => info!(
                    "Skipping {}: {} to {} is outside {}",
                    file.input_path.display(),
                    file.start,
                    file.end,
                    window
                ),
                Err(e) => failures.record(FailureRecord::new(
                    &dataset.service_url,
                    e.kind(),
                    e.to_string(),
                )),
            }
        }
        validated
    }
}
