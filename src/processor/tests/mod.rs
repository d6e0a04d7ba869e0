//! Orchestrator scenarios
//!
//! Runs the orchestrator over scratch mirror trees with a scripted
//! transform in place of the interpolator program.

pub mod ordering;

use crate::failure_log::FailureLog;
use crate::models::{Profile, ResampleFrequency, ValidatedFile};
use crate::processor::OutputNaming;
use crate::processor::transform::{ResampleJob, ResampleTransform, TransformError};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// How the scripted transform treats one input
#[derive(Debug, Clone, Copy)]
pub enum Script {
    TypeMismatch,
    IndexOutOfRange,
    MissingKey,
    /// Writes part of the output, then fails
    PartialWrite,
}

/// Transform that writes a small output file unless scripted to fail
#[derive(Default)]
pub struct ScriptedTransform {
    scripts: HashMap<String, Script>,
    pub calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedTransform {
    pub fn failing(mut self, file: &str, script: Script) -> Self {
        self.scripts.insert(file.to_string(), script);
        self
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl ResampleTransform for ScriptedTransform {
    async fn transform(&self, job: &ResampleJob<'_>) -> Result<(), TransformError> {
        self.calls.lock().unwrap().push(job.input.to_path_buf());
        let name = job.input.file_name().unwrap().to_string_lossy().to_string();

        match self.scripts.get(&name) {
            None => {
                std::fs::write(job.output, format!("resampled at {}", job.frequency))?;
                Ok(())
            }
            Some(Script::TypeMismatch) => Err(TransformError::TypeMismatch(
                "could not convert string to float".to_string(),
            )),
            Some(Script::IndexOutOfRange) => Err(TransformError::IndexOutOfRange(
                "index 1200 is out of bounds".to_string(),
            )),
            Some(Script::MissingKey) => Err(TransformError::MissingKey("depth".to_string())),
            Some(Script::PartialWrite) => {
                std::fs::write(job.output, "partial")?;
                Err(TransformError::Failed {
                    message: "killed".to_string(),
                })
            }
        }
    }
}

pub fn naming() -> OutputNaming {
    OutputNaming::new("2S".parse::<ResampleFrequency>().unwrap(), Profile::Sci)
}

pub fn failure_log(root: &Path) -> FailureLog {
    FailureLog::new(root, naming())
}

/// Create `<root>/<group>/<mission>/<file>` and its validated description,
/// starting `hour` hours into 2012-09-09
pub fn mirrored_file(root: &Path, file: &str, hour: u32) -> ValidatedFile {
    let group = "20120908_20120920";
    let mission = "20120909T010636";
    let dir = root.join(group).join(mission);
    std::fs::create_dir_all(&dir).unwrap();
    let input_path = dir.join(file);
    std::fs::write(&input_path, "raw").unwrap();

    ValidatedFile {
        service_url: format!(
            "http://elvis.shore.mbari.org/thredds/dodsC/LRAUV/tethys/missionlogs/2012/{}/{}/{}",
            group, mission, file
        ),
        mission_group_id: group.to_string(),
        input_path,
        start: Utc.with_ymd_and_hms(2012, 9, 9, hour, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2012, 9, 9, hour, 30, 0).unwrap(),
    }
}
