//! LRAUV Processor Library
//!
//! Discovers LRAUV mission logs in a date-partitioned THREDDS catalog,
//! validates their time coverage against a local mirror and resamples the
//! logs inside a requested window onto a fixed time base.
//!
//! This library provides tools for:
//! - Resolving processing windows and per-platform inputs
//! - Crawling mission group manifests with conservative date pruning
//! - Reading time coordinates and converting CF time units
//! - Idempotent, failure-isolated resampling through an external interpolator
//! - Driving monthly campaign database loads

pub mod catalog;
pub mod command;
pub mod config;
pub mod constants;
pub mod error;
pub mod failure_log;
pub mod models;
pub mod monthly;
pub mod parameters;
pub mod pipeline;
pub mod processor;
pub mod reader;
pub mod units;
pub mod validator;
pub mod window;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::ProcessorConfig;
pub use error::{LrauvError, Result};
pub use models::{DatasetRef, Profile, ResampleFrequency, TimeWindow, ValidatedFile};
pub use parameters::ParameterMap;
