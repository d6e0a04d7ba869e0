//! Configuration management and validation.
//!
//! Settings are layered: built-in defaults, then an optional JSON config
//! file, then environment overrides, then command line flags (applied by
//! the CLI). The result is validated before any crawling starts.

use crate::catalog::{MalformedGroupPolicy, compile_patterns};
use crate::command::ProgramSpec;
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_CATALOG_TEMPLATE, DEFAULT_CATALOG_TIMEOUT_SECS,
    DEFAULT_DB_PREFIX, DEFAULT_LOADER_PROGRAM, DEFAULT_MIRROR_TEMPLATE,
    DEFAULT_SCRIPT_MAKER_PROGRAM, DEFAULT_TIME_AXIS, DEFAULT_TRANSFORM_PROGRAM, LRAUV_PLATFORMS,
    env,
};
use crate::error::{LrauvError, Result};
use crate::window::InputTemplates;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Catalog access settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Catalog URL template; the last path segment is the file filter
    pub template: String,

    /// HTTP timeout for catalog requests in seconds
    pub timeout_secs: u64,

    /// Skip patterns added to the crawler defaults
    pub extra_skips: Vec<String>,

    pub malformed_groups: MalformedGroupPolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_CATALOG_TEMPLATE.to_string(),
            timeout_secs: DEFAULT_CATALOG_TIMEOUT_SECS,
            extra_skips: Vec::new(),
            malformed_groups: MalformedGroupPolicy::default(),
        }
    }
}

/// Local mirror settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Mirror directory template
    pub template: String,

    /// Name of the time coordinate read during validation
    pub time_axis: String,

    /// Concurrent time axis reads
    pub validation_workers: usize,

    /// Write per-file failure logs for the audit script
    pub write_failure_logs: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_MIRROR_TEMPLATE.to_string(),
            time_axis: DEFAULT_TIME_AXIS.to_string(),
            validation_workers: num_cpus::get(),
            write_failure_logs: true,
        }
    }
}

/// Interpolator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    pub program: PathBuf,

    /// Arguments placed before the job arguments, e.g. the script for `python3`
    pub args: Vec<String>,

    /// Files resampled concurrently
    pub workers: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_TRANSFORM_PROGRAM),
            args: Vec::new(),
            workers: 1,
        }
    }
}

impl TransformConfig {
    pub fn program_spec(&self) -> ProgramSpec {
        ProgramSpec::new(&self.program).with_args(self.args.iter().cloned())
    }
}

/// Monthly load settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonthlyConfig {
    pub loader_program: PathBuf,
    pub loader_args: Vec<String>,
    pub script_maker_program: PathBuf,
    pub script_maker_args: Vec<String>,
    pub db_prefix: String,
}

impl Default for MonthlyConfig {
    fn default() -> Self {
        Self {
            loader_program: PathBuf::from(DEFAULT_LOADER_PROGRAM),
            loader_args: Vec::new(),
            script_maker_program: PathBuf::from(DEFAULT_SCRIPT_MAKER_PROGRAM),
            script_maker_args: Vec::new(),
            db_prefix: DEFAULT_DB_PREFIX.to_string(),
        }
    }
}

impl MonthlyConfig {
    pub fn loader_spec(&self) -> ProgramSpec {
        ProgramSpec::new(&self.loader_program).with_args(self.loader_args.iter().cloned())
    }

    pub fn script_maker_spec(&self) -> ProgramSpec {
        ProgramSpec::new(&self.script_maker_program)
            .with_args(self.script_maker_args.iter().cloned())
    }
}

/// Main configuration for the processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    pub catalog: CatalogConfig,
    pub mirror: MirrorConfig,
    pub transform: TransformConfig,
    pub monthly: MonthlyConfig,

    /// Platforms processed when none is named
    pub platforms: Vec<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            mirror: MirrorConfig::default(),
            transform: TransformConfig::default(),
            monthly: MonthlyConfig::default(),
            platforms: LRAUV_PLATFORMS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ProcessorConfig {
    /// `<config dir>/lrauv-processor/config.json`, if the platform has a
    /// config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Parse a JSON config document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LrauvError::configuration(format!("Invalid config: {}", e)))
    }

    /// Load defaults overlaid with a config file.
    ///
    /// An explicit path must exist; the default path is used only when
    /// present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(LrauvError::configuration(format!(
                        "Config file {} not found",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => Self::default_config_path().filter(|p| p.is_file()),
        };

        match path {
            Some(path) => {
                debug!("Reading config from {}", path.display());
                let json = std::fs::read_to_string(&path)?;
                Self::from_json(&json).map_err(|e| {
                    LrauvError::configuration(format!("{}: {}", path.display(), e))
                })
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides from a lookup function
    pub fn apply_env_from<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(value) = lookup(env::MIRROR_TEMPLATE) {
            debug!("{} overrides mirror template", env::MIRROR_TEMPLATE);
            self.mirror.template = value;
        }
        if let Some(value) = lookup(env::CATALOG_TEMPLATE) {
            debug!("{} overrides catalog template", env::CATALOG_TEMPLATE);
            self.catalog.template = value;
        }
        if let Some(value) = lookup(env::TRANSFORM_PROGRAM) {
            self.transform.program = PathBuf::from(value);
        }
        if let Some(value) = lookup(env::LOADER_PROGRAM) {
            self.monthly.loader_program = PathBuf::from(value);
        }
    }

    /// Check the settings for consistency
    pub fn validate(&self) -> Result<()> {
        if self.mirror.template.trim().is_empty() {
            return Err(LrauvError::configuration("Mirror template is empty"));
        }
        match self.catalog.template.rsplit_once('/') {
            Some((base, filter)) if !base.is_empty() && !filter.is_empty() => {}
            _ => {
                return Err(LrauvError::configuration(format!(
                    "Catalog template '{}' must end with a file filter segment",
                    self.catalog.template
                )));
            }
        }
        if self.catalog.timeout_secs == 0 {
            return Err(LrauvError::configuration("Catalog timeout must be positive"));
        }
        compile_patterns(&self.catalog.extra_skips)?;

        if self.mirror.time_axis.trim().is_empty() {
            return Err(LrauvError::configuration("Time axis name is empty"));
        }
        if self.mirror.validation_workers == 0 || self.transform.workers == 0 {
            return Err(LrauvError::configuration("Worker counts must be positive"));
        }
        if self.platforms.is_empty() || self.platforms.iter().any(|p| p.trim().is_empty()) {
            return Err(LrauvError::configuration("Platform list is empty or has blank names"));
        }
        if self.monthly.db_prefix.trim().is_empty() {
            return Err(LrauvError::configuration("Database prefix is empty"));
        }
        Ok(())
    }

    pub fn input_templates(&self) -> InputTemplates {
        InputTemplates {
            mirror_dir: self.mirror.template.clone(),
            catalog_url: self.catalog.template.clone(),
        }
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.timeout_secs)
    }

    pub fn with_transform_workers(mut self, workers: usize) -> Self {
        self.transform.workers = workers;
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<String>) -> Self {
        self.platforms = platforms;
        self
    }
}
