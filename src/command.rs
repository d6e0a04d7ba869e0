//! External program invocation shared by the interpolator and loader adapters.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Number of trailing stderr lines kept for error messages
const STDERR_TAIL_LINES: usize = 20;

/// Program plus fixed leading arguments, e.g. `python3 lrauvNc4ToNetcdf.py`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSpec {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
}

impl ProgramSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run with the given trailing arguments and capture the output
    pub async fn run(&self, args: &[OsString]) -> std::io::Result<CommandOutput> {
        run(&self.program, &self.leading_args, args).await
    }
}

/// Captured result of a finished program
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last lines of stderr, for error messages
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
    }
}

async fn run(
    program: &Path,
    leading_args: &[String],
    args: &[OsString],
) -> std::io::Result<CommandOutput> {
    debug!(
        "Running {} {} {:?}",
        program.display(),
        leading_args.join(" "),
        args
    );
    let output = Command::new(program)
        .args(leading_args)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
