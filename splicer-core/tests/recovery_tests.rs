// splicer-core/tests/recovery_tests.rs

use splicer_core::error::CoreError;
use splicer_core::recovery::{
    FailureContext, RecoveryManager, STEP_PRESERVE_SEGMENTS, STEP_REMOVE_ATTEMPT_ARTIFACTS,
    STEP_REMOVE_PARTIAL_OUTPUT, STEP_REMOVE_WORKSPACE,
};
use splicer_core::state::JobStage;
use splicer_core::workspace::JobWorkspace;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn populated_workspace(work_dir: &Path) -> JobWorkspace {
    let ws = JobWorkspace::for_input(work_dir, Path::new("film.mkv"));
    ws.create().unwrap();
    for i in 0..3 {
        fs::write(ws.segment_path(i), vec![0u8; 2048]).unwrap();
    }
    fs::write(ws.encoded_path(0), b"av1").unwrap();
    fs::write(ws.attempt_path(1), b"half").unwrap();
    ws
}

#[test]
fn test_encode_failure_keeps_segments_for_resume() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let ws = populated_workspace(dir.path());
    let mut manager = RecoveryManager::new(dir.path());
    let error = CoreError::SegmentsFailed { first_index: 1, count: 1 };

    let record = manager
        .handle_failure(
            &FailureContext {
                job_id: "20260101000000-abcdef",
                stage: JobStage::Encode,
                error: &error,
                partial_output: None,
            },
            &ws,
        )?
        .expect("first failure is handled");

    assert_eq!(record.stage, JobStage::Encode);
    assert_eq!(record.segment_index, Some(1));
    assert!(record.failed_steps.is_empty());
    assert!(record.completed_steps.contains(&STEP_PRESERVE_SEGMENTS.to_string()));
    assert!(!record.completed_steps.contains(&STEP_REMOVE_WORKSPACE.to_string()));
    assert!(record.completed_at.is_some());

    for i in 0..3 {
        assert!(ws.segment_path(i).is_file());
    }
    assert!(ws.encoded_path(0).is_file());
    assert!(!ws.attempt_path(1).exists());

    let persisted = manager.load_record("20260101000000-abcdef")?.expect("record on disk");
    assert_eq!(persisted, record);
    Ok(())
}

#[test]
fn test_late_failure_removes_workspace_and_partial_output() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let ws = populated_workspace(dir.path());
    let partial = dir.path().join("out.mkv");
    fs::write(&partial, b"truncated")?;
    let mut manager = RecoveryManager::new(dir.path());
    let error = CoreError::Mux("audio track count differs".to_string());

    let record = manager
        .handle_failure(
            &FailureContext {
                job_id: "job-mux",
                stage: JobStage::Mux,
                error: &error,
                partial_output: Some(&partial),
            },
            &ws,
        )?
        .expect("first failure is handled");

    assert_eq!(
        &record.completed_steps[..2],
        &[
            STEP_REMOVE_PARTIAL_OUTPUT.to_string(),
            STEP_REMOVE_ATTEMPT_ARTIFACTS.to_string()
        ]
    );
    assert!(record.completed_steps.contains(&STEP_REMOVE_WORKSPACE.to_string()));
    assert!(!partial.exists());
    assert!(!ws.exists());
    assert!(manager.record_path("job-mux").is_file());
    Ok(())
}

#[test]
fn test_each_job_is_recovered_once() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let ws = populated_workspace(dir.path());
    let mut manager = RecoveryManager::new(dir.path());
    let error = CoreError::Concatenation("segment 2 is missing".to_string());
    let context = FailureContext {
        job_id: "job-concat",
        stage: JobStage::Concatenation,
        error: &error,
        partial_output: None,
    };

    assert!(manager.handle_failure(&context, &ws)?.is_some());
    assert!(manager.handle_failure(&context, &ws)?.is_none());
    Ok(())
}
