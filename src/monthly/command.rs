//! Load pipeline backed by the loader and script maker programs.

use super::{LoadPipeline, YearMonth};
use crate::command::{CommandOutput, ProgramSpec};
use crate::constants::DEFAULT_DB_PREFIX;
use crate::error::{LrauvError, Result};
use std::ffi::OsString;
use tracing::debug;

/// Verbosity at which the loader itself is made verbose
const LOADER_VERBOSE_LEVEL: u8 = 3;

#[derive(Debug, Clone)]
pub struct CommandLoadPipeline {
    loader: ProgramSpec,
    script_maker: ProgramSpec,
    db_prefix: String,
    test: bool,
    verbose: u8,
}

impl CommandLoadPipeline {
    pub fn new(loader: ProgramSpec, script_maker: ProgramSpec) -> Self {
        Self {
            loader,
            script_maker,
            db_prefix: DEFAULT_DB_PREFIX.to_string(),
            test: false,
            verbose: 0,
        }
    }

    pub fn with_db_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.db_prefix = prefix.into();
        self
    }

    /// Load into test databases
    pub fn with_test(mut self, test: bool) -> Self {
        self.test = test;
        self
    }

    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Arguments of the load step
    pub fn load_arguments(&self, db: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> =
            vec!["--db".into(), db.into(), "--clobber".into(), "--noinput".into()];
        if self.test {
            args.push("--test".into());
        }
        if self.verbose >= LOADER_VERBOSE_LEVEL {
            args.push("-v".into());
        }
        args
    }

    async fn invoke(&self, spec: &ProgramSpec, args: Vec<OsString>) -> Result<CommandOutput> {
        let output = spec.run(&args).await?;
        if !output.success() {
            return Err(LrauvError::Command {
                program: spec.program.clone(),
                status: output.status.to_string(),
                stderr: output.stderr_tail(),
            });
        }
        debug!("{} finished", spec.program.display());
        Ok(output)
    }
}

/// Campaign names printed by the script maker, one per line
pub fn parse_campaigns(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl LoadPipeline for CommandLoadPipeline {
    async fn generate_load_scripts(&self, year: i32) -> Result<Vec<String>> {
        let output = self
            .invoke(&self.script_maker, vec!["--year".into(), year.to_string().into()])
            .await?;
        let campaigns = parse_campaigns(&output.stdout);
        if !campaigns.is_empty() {
            return Ok(campaigns);
        }
        (1..=12)
            .map(|month| YearMonth::new(year, month).map(|m| m.db_name(&self.db_prefix)))
            .collect()
    }

    async fn register_campaigns(&self, campaigns: &[String]) -> Result<()> {
        let mut args: Vec<OsString> = vec!["--update-campaigns".into()];
        args.extend(campaigns.iter().map(OsString::from));
        self.invoke(&self.script_maker, args).await.map(|_| ())
    }

    async fn load(&self, db: &str) -> Result<()> {
        self.invoke(&self.loader, self.load_arguments(db))
            .await
            .map(|_| ())
    }

    async fn update_provenance(&self, db: &str) -> Result<()> {
        self.invoke(&self.loader, vec!["--db".into(), db.into(), "--updateprovenance".into()])
            .await
            .map(|_| ())
    }

    async fn dump(&self, db: &str) -> Result<()> {
        self.invoke(&self.loader, vec!["--db".into(), db.into(), "--pg_dump".into()])
            .await
            .map(|_| ())
    }
}
