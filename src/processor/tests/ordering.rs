//! Chronological processing order

use super::{ScriptedTransform, failure_log, mirrored_file, naming};
use crate::models::Profile;
use crate::parameters;
use crate::processor::ResampleOrchestrator;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_files_run_in_start_order() {
    let temp_dir = TempDir::new().unwrap();
    let files = vec![
        mirrored_file(temp_dir.path(), "late.nc4", 5),
        mirrored_file(temp_dir.path(), "early.nc4", 1),
        mirrored_file(temp_dir.path(), "middle.nc4", 3),
    ];
    let orchestrator = ResampleOrchestrator::new(ScriptedTransform::default(), naming());
    let parameters = parameters::builtin(Profile::Eng).unwrap();
    let mut log = failure_log(temp_dir.path());

    let report = orchestrator
        .run(&files, &parameters, &mut log, &CancellationToken::new())
        .await;

    let order: Vec<String> = orchestrator
        .transform()
        .calls()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(order, vec!["early.nc4", "middle.nc4", "late.nc4"]);
    assert_eq!(report.produced[0], naming().output_path(&files[1].input_path));
}

#[tokio::test]
async fn test_ties_break_on_service_url() {
    let temp_dir = TempDir::new().unwrap();
    let files = vec![
        mirrored_file(temp_dir.path(), "b.nc4", 2),
        mirrored_file(temp_dir.path(), "a.nc4", 2),
    ];
    let orchestrator =
        ResampleOrchestrator::new(ScriptedTransform::default(), naming()).with_workers(4);
    let parameters = parameters::builtin(Profile::Eng).unwrap();
    let mut log = failure_log(temp_dir.path());

    let report = orchestrator
        .run(&files, &parameters, &mut log, &CancellationToken::new())
        .await;

    // Results are consumed in order regardless of worker count
    assert_eq!(
        report.produced,
        vec![
            naming().output_path(&files[1].input_path),
            naming().output_path(&files[0].input_path),
        ]
    );
}
