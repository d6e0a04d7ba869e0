//! Resample orchestration.
//!
//! Gives every validated log a deterministic output path, skips logs that
//! already have an output, drives the transform for the rest in
//! chronological order and turns every per-file failure into a failure
//! record so one bad log never stops the run.

pub mod transform;

#[cfg(test)]
pub mod tests;

use self::transform::{ResampleJob, ResampleTransform, TransformError};

use crate::constants::{FAILURE_LOG_SUFFIX, OUTPUT_SUFFIX};
use crate::error::{LrauvError, Result};
use crate::failure_log::{FailureKind, FailureLog, FailureRecord};
use crate::models::{Profile, ResampleFrequency, RunOptions, ValidatedFile};
use crate::parameters::ParameterMap;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Derives output and audit log names from the raw log name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    frequency: ResampleFrequency,
    profile: Profile,
}

impl OutputNaming {
    pub fn new(frequency: ResampleFrequency, profile: Profile) -> Self {
        Self { frequency, profile }
    }

    pub fn frequency(&self) -> &ResampleFrequency {
        &self.frequency
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    fn sibling(&self, input: &Path, suffix: &str) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        let name = format!("{}_{}_{}.{}", stem, self.frequency, self.profile, suffix);
        match input.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// `mission.nc4` → `mission_<freq>_<profile>.nc` in the same directory
    pub fn output_path(&self, input: &Path) -> PathBuf {
        self.sibling(input, OUTPUT_SUFFIX)
    }

    /// `mission.nc4` → `mission_<freq>_<profile>.log` in the same directory
    pub fn log_path(&self, input: &Path) -> PathBuf {
        self.sibling(input, FAILURE_LOG_SUFFIX)
    }
}

/// What happened to one validated log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Produced(PathBuf),
    Skipped(PathBuf),
}

/// Result of an orchestrator run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResampleReport {
    pub produced: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// Service URLs of logs that failed to resample
    pub failed: Vec<String>,
    pub interrupted: bool,
}

/// Classify a transform failure for the file at `url`
pub fn classify(url: &str, error: TransformError) -> LrauvError {
    let url = url.to_string();
    match error {
        TransformError::TypeMismatch(_) => {
            warn!("{} data are invalid, skipping: {}", url, error);
            LrauvError::InvalidData { url, source: error }
        }
        TransformError::IndexOutOfRange(_) => {
            warn!("Problem interpolating data from {}: {}", url, error);
            LrauvError::Interpolation { url, source: error }
        }
        TransformError::MissingKey(message) => LrauvError::Server { url, message },
        other => LrauvError::Transform { url, source: other },
    }
}

/// Failure record kind for an orchestrator error
pub fn failure_kind(error: &LrauvError) -> FailureKind {
    match error {
        LrauvError::InvalidData { .. } => FailureKind::TypeMismatch,
        LrauvError::Interpolation { .. } => FailureKind::IndexOutOfRange,
        LrauvError::Server { .. } => FailureKind::MissingParameter,
        _ => FailureKind::TransformFailed,
    }
}

/// Drives the transform over validated logs
#[derive(Debug)]
pub struct ResampleOrchestrator<T> {
    transform: T,
    naming: OutputNaming,
    options: RunOptions,
    convert_angles: bool,
    workers: usize,
    show_progress: bool,
}

impl<T: ResampleTransform> ResampleOrchestrator<T> {
    pub fn new(transform: T, naming: OutputNaming) -> Self {
        Self {
            transform,
            naming,
            options: RunOptions::default(),
            convert_angles: true,
            workers: 1,
            show_progress: false,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of logs resampled concurrently; results are still consumed
    /// in chronological order
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn naming(&self) -> &OutputNaming {
        &self.naming
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// Resample one log unless its output already exists
    pub async fn process_file(
        &self,
        file: &ValidatedFile,
        parameters: &ParameterMap,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome> {
        let output = self.naming.output_path(&file.input_path);
        if tokio::fs::try_exists(&output).await? {
            info!("Skipping {}: {} exists", file.input_path.display(), output.display());
            return Ok(FileOutcome::Skipped(output));
        }

        let job = ResampleJob {
            input: &file.input_path,
            output: &output,
            frequency: self.naming.frequency(),
            parameters,
            convert_angles: self.convert_angles,
            options: self.options,
        };
        info!("Resampling {} -> {}", file.input_path.display(), output.display());

        let result = tokio::select! {
            result = self.transform.transform(&job) => {
                result.map_err(|e| classify(&file.service_url, e))
            }
            _ = cancel.cancelled() => {
                Err(LrauvError::interrupted(format!("while resampling {}", file.service_url)))
            }
        };

        match result {
            Ok(()) => Ok(FileOutcome::Produced(output)),
            Err(e) => {
                remove_partial(&output).await;
                Err(e)
            }
        }
    }

    /// Resample validated logs in ascending `(start, service_url)` order.
    ///
    /// Per-file failures are recorded in `failures` and never abort the run;
    /// cancellation stops scheduling further logs.
    pub async fn run(
        &self,
        files: &[ValidatedFile],
        parameters: &ParameterMap,
        failures: &mut FailureLog,
        cancel: &CancellationToken,
    ) -> ResampleReport {
        let mut ordered: Vec<&ValidatedFile> = files.iter().collect();
        ordered.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.service_url.cmp(&b.service_url))
        });

        let progress_bar = self.progress_bar(ordered.len());
        let mut report = ResampleReport::default();

        let mut results = stream::iter(ordered)
            .map(|file| async move {
                if cancel.is_cancelled() {
                    return (file, None);
                }
                (file, Some(self.process_file(file, parameters, cancel).await))
            })
            .buffered(self.workers);

        while let Some((file, result)) = results.next().await {
            if let Some(pb) = &progress_bar {
                pb.inc(1);
                pb.set_message(
                    file.input_path
                        .file_name()
                        .unwrap_or_default()
                        .to_string_lossy()
                        .to_string(),
                );
            }

            match result {
                None | Some(Err(LrauvError::Interrupted { .. })) => report.interrupted = true,
                Some(Ok(FileOutcome::Produced(path))) => report.produced.push(path),
                Some(Ok(FileOutcome::Skipped(path))) => report.skipped.push(path),
                Some(Err(e)) => {
                    failures.record(FailureRecord::new(
                        &file.service_url,
                        failure_kind(&e),
                        e.to_string(),
                    ));
                    report.failed.push(file.service_url.clone());
                }
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message(format!(
                "{} produced, {} skipped, {} failed",
                report.produced.len(),
                report.skipped.len(),
                report.failed.len()
            ));
        }
        if report.interrupted {
            warn!("Resampling interrupted; remaining files were not scheduled");
        }
        report
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.show_progress || total == 0 {
            return None;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message("Resampling...");
        Some(pb)
    }
}

async fn remove_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!("Removed partial output {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Can't remove partial output {}: {}", output.display(), e),
    }
}
