//! Error handling for LRAUV discovery, validation and resampling.
//!
//! Provides the crate-wide error type. Only configuration errors are fatal
//! to a run; every per-file error is caught at the orchestration boundary
//! and turned into a failure record.

use crate::processor::transform::TransformError;
use crate::validator::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LrauvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Malformed mission group '{group_id}': {reason}")]
    CrawlDefect { group_id: String, reason: String },

    #[error("Catalog error at {url}: {reason}")]
    Catalog { url: String, reason: String },

    #[error("Can't validate {url}: {source}")]
    Validation {
        url: String,
        #[source]
        source: ValidationError,
    },

    #[error("Invalid data in {url}: {source}")]
    InvalidData {
        url: String,
        #[source]
        source: TransformError,
    },

    #[error("Problem interpolating data from {url}: {source}")]
    Interpolation {
        url: String,
        #[source]
        source: TransformError,
    },

    #[error("Key error - can't read parameters from {url}: {message}")]
    Server { url: String, message: String },

    #[error("Resampling failed for {url}: {source}")]
    Transform {
        url: String,
        #[source]
        source: TransformError,
    },

    #[error("Command '{program}' failed ({status}): {stderr}")]
    Command {
        program: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("Processing interrupted: {reason}")]
    Interrupted { reason: String },
}

impl LrauvError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a crawl defect for a mission group identifier
    pub fn crawl_defect(group_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CrawlDefect {
            group_id: group_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a catalog access error
    pub fn catalog(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Catalog {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a processing interrupted error
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, LrauvError>;
