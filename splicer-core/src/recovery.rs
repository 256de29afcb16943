// ============================================================================
// splicer-core/src/recovery.rs
// ============================================================================
//
// RECOVERY MANAGER: Diagnostics and Staged Cleanup on Fatal Failure
//
// Every job-fatal error ends up here exactly once. The manager writes a
// `CleanupRecord` to `<work_dir>/recovery/<job_id>.json` before touching
// anything, runs the cleanup steps one by one while recording which of them
// worked, and writes the record again with a completion timestamp.
//
// Segment files survive a failure in the encode stage so that the next run
// can resume without segmenting again. Any other stage removes the whole
// job workspace.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::state::JobStage;
use crate::state::store::write_atomic;
use crate::workspace::{JobWorkspace, is_attempt_artifact, recovery_dir};

/// Prefix of the scratch directories ab-av1 leaves behind when killed.
const ENCODER_TEMP_PREFIX: &str = ".ab-av1-";

pub const STEP_REMOVE_PARTIAL_OUTPUT: &str = "remove_partial_output";
pub const STEP_REMOVE_ATTEMPT_ARTIFACTS: &str = "remove_attempt_artifacts";
pub const STEP_REMOVE_ENCODER_TEMP_DIRS: &str = "remove_encoder_temp_dirs";
pub const STEP_PRESERVE_SEGMENTS: &str = "preserve_segments";
pub const STEP_REMOVE_WORKSPACE: &str = "remove_workspace";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedStep {
    pub step: String,
    pub error: String,
}

/// Postmortem record of one fatal failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupRecord {
    pub job_id: String,
    pub stage: JobStage,
    pub error: String,
    pub segment_index: Option<usize>,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<FailedStep>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What the pipeline knows about a failure.
#[derive(Debug)]
pub struct FailureContext<'a> {
    pub job_id: &'a str,
    pub stage: JobStage,
    pub error: &'a CoreError,
    /// Output file the job may have partially written.
    pub partial_output: Option<&'a Path>,
}

#[derive(Debug)]
pub struct RecoveryManager {
    work_dir: PathBuf,
    handled: HashSet<String>,
}

impl RecoveryManager {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            handled: HashSet::new(),
        }
    }

    pub fn record_path(&self, job_id: &str) -> PathBuf {
        recovery_dir(&self.work_dir).join(format!("{job_id}.json"))
    }

    /// Loads a previously written record.
    pub fn load_record(&self, job_id: &str) -> CoreResult<Option<CleanupRecord>> {
        let path = self.record_path(job_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Records the failure and cleans up the job workspace.
    ///
    /// Returns `None` if this job was already handled. Cleanup step failures
    /// are recorded, not returned; only failing to persist the record is an
    /// error.
    pub fn handle_failure(
        &mut self,
        context: &FailureContext<'_>,
        workspace: &JobWorkspace,
    ) -> CoreResult<Option<CleanupRecord>> {
        if !self.handled.insert(context.job_id.to_string()) {
            warn!("Failure of job {} was already handled", context.job_id);
            return Ok(None);
        }

        let mut record = CleanupRecord {
            job_id: context.job_id.to_string(),
            stage: context.stage,
            error: context.error.to_string(),
            segment_index: context.error.segment_index(),
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        };
        self.persist(&record)?;
        warn!(
            "Job {} failed during {}: {}",
            record.job_id, record.stage, record.error
        );

        run_step(&mut record, STEP_REMOVE_PARTIAL_OUTPUT, || {
            remove_partial_output(context.partial_output)
        });
        run_step(&mut record, STEP_REMOVE_ATTEMPT_ARTIFACTS, || {
            remove_attempt_artifacts(workspace)
        });
        run_step(&mut record, STEP_REMOVE_ENCODER_TEMP_DIRS, || {
            remove_encoder_temp_dirs(workspace)
        });
        if context.stage == JobStage::Encode {
            run_step(&mut record, STEP_PRESERVE_SEGMENTS, || {
                info!(
                    "Keeping segments in {} for resume",
                    workspace.segments_dir().display()
                );
                Ok(())
            });
        } else {
            run_step(&mut record, STEP_REMOVE_WORKSPACE, || workspace.remove());
        }

        record.completed_at = Some(Utc::now());
        self.persist(&record)?;
        info!(
            "Cleanup for job {} finished: {} step(s) done, {} failed; record at {}",
            record.job_id,
            record.completed_steps.len(),
            record.failed_steps.len(),
            self.record_path(&record.job_id).display()
        );
        Ok(Some(record))
    }

    fn persist(&self, record: &CleanupRecord) -> CoreResult<()> {
        let dir = recovery_dir(&self.work_dir);
        fs::create_dir_all(&dir)?;
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.record_path(&record.job_id), &bytes)?;
        Ok(())
    }
}

fn run_step<F>(record: &mut CleanupRecord, step: &str, action: F)
where
    F: FnOnce() -> CoreResult<()>,
{
    match action() {
        Ok(()) => record.completed_steps.push(step.to_string()),
        Err(e) => {
            warn!("Cleanup step {step} failed: {e}");
            record.failed_steps.push(FailedStep {
                step: step.to_string(),
                error: e.to_string(),
            });
        }
    }
}

fn remove_partial_output(output: Option<&Path>) -> CoreResult<()> {
    match output {
        Some(path) if path.exists() => {
            fs::remove_file(path)?;
            info!("Removed partial output {}", path.display());
            Ok(())
        }
        _ => Ok(()),
    }
}

fn remove_attempt_artifacts(workspace: &JobWorkspace) -> CoreResult<()> {
    let mut targets = Vec::new();
    for dir in [workspace.encoded_dir(), workspace.root().to_path_buf()] {
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && is_attempt_artifact(&path) {
                targets.push(path);
            }
        }
    }
    for path in targets {
        fs::remove_file(&path)?;
    }
    Ok(())
}

fn remove_encoder_temp_dirs(workspace: &JobWorkspace) -> CoreResult<()> {
    for dir in [
        workspace.root().to_path_buf(),
        workspace.segments_dir(),
        workspace.encoded_dir(),
    ] {
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_encoder_temp = path.is_dir()
                && path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(ENCODER_TEMP_PREFIX));
            if is_encoder_temp {
                fs::remove_dir_all(&path)?;
            }
        }
    }
    Ok(())
}
