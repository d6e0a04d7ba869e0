//! The resampling transform seam.
//!
//! The interpolation numerics live outside this crate. [`ResampleTransform`]
//! is the contract the orchestrator drives; [`ExternalCommandTransform`]
//! satisfies it by running the interpolator program.

use crate::command::ProgramSpec;
use crate::constants::transform_exit;
use crate::models::{ResampleFrequency, RunOptions};
use crate::parameters::ParameterMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// One file to resample
#[derive(Debug, Clone)]
pub struct ResampleJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub frequency: &'a ResampleFrequency,
    pub parameters: &'a ParameterMap,
    /// Convert angular variables from radians to degrees
    pub convert_angles: bool,
    pub options: RunOptions,
}

#[derive(Error, Debug)]
pub enum TransformError {
    /// Sample types in the raw file don't match the expected schema
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Interpolation ran past the end of a variable
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    /// A requested parameter is absent from the raw file
    #[error("missing key: {0}")]
    MissingKey(String),

    #[error("{message}")]
    Failed { message: String },

    #[error("can't run interpolator: {0}")]
    Io(#[from] std::io::Error),
}

/// Resamples one raw log into a fixed-frequency output file
pub trait ResampleTransform {
    fn transform(&self, job: &ResampleJob<'_>) -> impl Future<Output = Result<(), TransformError>>;
}

/// Runs the interpolator program for every job
#[derive(Debug, Clone)]
pub struct ExternalCommandTransform {
    program: ProgramSpec,
}

impl ExternalCommandTransform {
    pub fn new(program: ProgramSpec) -> Self {
        Self { program }
    }

    /// Trailing arguments for a job
    pub fn arguments(job: &ResampleJob<'_>) -> Result<Vec<OsString>, TransformError> {
        let parms = job
            .parameters
            .to_json()
            .map_err(|e| TransformError::Failed {
                message: e.to_string(),
            })?;

        let mut args: Vec<OsString> = vec![
            "--input".into(),
            job.input.into(),
            "--output".into(),
            job.output.into(),
            "--resample-freq".into(),
            job.frequency.as_str().into(),
            "--parms".into(),
            parms.into(),
        ];
        if job.convert_angles {
            args.push("--rad-to-deg".into());
        }
        if job.options.use_tracking_db {
            args.push("--trackingdb".into());
        }
        if job.options.nudge_to_gps {
            args.push("--nudge".into());
        }
        Ok(args)
    }
}

impl ResampleTransform for ExternalCommandTransform {
    async fn transform(&self, job: &ResampleJob<'_>) -> Result<(), TransformError> {
        let args = Self::arguments(job)?;
        let output = self.program.run(&args).await?;
        if output.success() {
            debug!("Interpolator wrote {}", job.output.display());
            return Ok(());
        }

        let message = output.stderr_tail();
        Err(match output.status.code() {
            Some(transform_exit::TYPE_MISMATCH) => TransformError::TypeMismatch(message),
            Some(transform_exit::INDEX_OUT_OF_RANGE) => TransformError::IndexOutOfRange(message),
            Some(transform_exit::MISSING_KEY) => TransformError::MissingKey(message),
            Some(code) => TransformError::Failed {
                message: format!("exit code {}: {}", code, message),
            },
            None => TransformError::Failed {
                message: format!("terminated by signal: {}", message),
            },
        })
    }
}
