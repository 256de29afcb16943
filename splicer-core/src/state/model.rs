// ============================================================================
// splicer-core/src/state/model.rs
// ============================================================================
//
// JOB STATE MODEL: Jobs, Segments and Their Transitions
//
// Plain serde types persisted by the state store. `Segment::apply` is the
// only place a segment changes status; the state actor calls it for every
// event a worker reports.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::encoding::ladder::StrategyKind;
use crate::error::{CoreError, CoreResult};
use crate::processing::classify::EncodeStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Pipeline stage a job was in, used to attribute fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Validation,
    Analysis,
    Segmentation,
    Encode,
    Concatenation,
    Audio,
    Mux,
    Finalize,
    State,
    Unknown,
}

impl JobStage {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Validation => "validation",
            JobStage::Analysis => "analysis",
            JobStage::Segmentation => "segmentation",
            JobStage::Encode => "encode",
            JobStage::Concatenation => "concatenation",
            JobStage::Audio => "audio",
            JobStage::Mux => "mux",
            JobStage::Finalize => "finalize",
            JobStage::State => "state",
            JobStage::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Unknown until the content classifier has run.
    pub strategy: Option<EncodeStrategy>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(input_path: &Path, output_path: &Path) -> Self {
        let now = Utc::now();
        Self {
            id: generate_job_id(now),
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            strategy: None,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn generate_job_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{suffix}", now.format("%Y%m%d%H%M%S"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    Encoding,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    InProgress,
    Succeeded,
    Failed { error: String },
    Cancelled,
}

/// One entry of a segment's attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub strategy: StrategyKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: AttemptOutcome,
}

/// Events a worker reports about a segment.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    AttemptStarted(StrategyKind),
    AttemptSucceeded,
    AttemptFailed(String),
    /// The attempt was interrupted; it does not consume a rung.
    AttemptCancelled,
    /// Encoded output already existed on disk.
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub start_time: f64,
    pub duration: f64,
    pub status: SegmentStatus,
    pub attempts: u32,
    pub last_strategy: Option<StrategyKind>,
    pub error: Option<String>,
    #[serde(default)]
    pub history: Vec<AttemptRecord>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    pub fn new(index: usize, path: PathBuf, size_bytes: u64, start_time: f64, duration: f64) -> Self {
        Self {
            index,
            path,
            size_bytes,
            start_time,
            duration,
            status: SegmentStatus::Pending,
            attempts: 0,
            last_strategy: None,
            error: None,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SegmentStatus::Completed
    }

    /// Applies one event, enforcing the segment state machine.
    pub fn apply(&mut self, event: SegmentEvent, max_attempts: usize) -> CoreResult<()> {
        let now = Utc::now();
        match event {
            SegmentEvent::AttemptStarted(strategy) => {
                if self.attempts as usize >= max_attempts {
                    return Err(CoreError::AttemptsExhausted {
                        index: self.index,
                        max: max_attempts,
                    });
                }
                self.expect_status(SegmentStatus::Pending, "start an attempt")?;
                self.attempts += 1;
                self.status = SegmentStatus::Encoding;
                self.last_strategy = Some(strategy);
                self.history.push(AttemptRecord {
                    attempt: self.attempts,
                    strategy,
                    started_at: now,
                    finished_at: None,
                    outcome: AttemptOutcome::InProgress,
                });
            }
            SegmentEvent::AttemptSucceeded => {
                self.expect_status(SegmentStatus::Encoding, "complete an attempt")?;
                self.status = SegmentStatus::Completed;
                self.error = None;
                self.finish_attempt(AttemptOutcome::Succeeded, now);
            }
            SegmentEvent::AttemptFailed(error) => {
                self.expect_status(SegmentStatus::Encoding, "fail an attempt")?;
                self.status = if self.attempts as usize >= max_attempts {
                    SegmentStatus::Failed
                } else {
                    SegmentStatus::Pending
                };
                self.finish_attempt(AttemptOutcome::Failed { error: error.clone() }, now);
                self.error = Some(error);
            }
            SegmentEvent::AttemptCancelled => {
                self.expect_status(SegmentStatus::Encoding, "cancel an attempt")?;
                self.attempts = self.attempts.saturating_sub(1);
                self.status = SegmentStatus::Pending;
                self.finish_attempt(AttemptOutcome::Cancelled, now);
                self.last_strategy = self
                    .history
                    .iter()
                    .rev()
                    .find(|r| r.outcome != AttemptOutcome::Cancelled)
                    .map(|r| r.strategy);
            }
            SegmentEvent::Resumed => {
                self.status = SegmentStatus::Completed;
                self.error = None;
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// Prepares a segment loaded from a previous run for a new dispatch.
    /// Completed segments are left alone; everything else gets a fresh ladder.
    pub fn reset_for_resume(&mut self) {
        if self.is_completed() {
            return;
        }
        self.status = SegmentStatus::Pending;
        self.attempts = 0;
        self.updated_at = Utc::now();
    }

    fn expect_status(&self, expected: SegmentStatus, action: &str) -> CoreResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(CoreError::StateStore(format!(
                "cannot {action} on segment {} in state {:?}",
                self.index, self.status
            )))
        }
    }

    fn finish_attempt(&mut self, outcome: AttemptOutcome, now: DateTime<Utc>) {
        if let Some(record) = self
            .history
            .iter_mut()
            .rev()
            .find(|r| r.outcome == AttemptOutcome::InProgress)
        {
            record.outcome = outcome;
            record.finished_at = Some(now);
        }
    }
}

/// Counts per status, recomputed after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub job_id: String,
    pub job_status: JobStatus,
    pub total: usize,
    pub pending: usize,
    pub encoding: usize,
    pub completed: usize,
    pub failed: usize,
    pub percent_complete: f64,
    pub updated_at: DateTime<Utc>,
}

/// In-memory view of everything persisted for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobLedger {
    pub job: Job,
    pub segments: Vec<Segment>,
}

impl JobLedger {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            segments: Vec::new(),
        }
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.iter().find(|s| s.index == index)
    }

    pub fn apply(&mut self, index: usize, event: SegmentEvent, max_attempts: usize) -> CoreResult<()> {
        let segment = self
            .segments
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or_else(|| CoreError::StateStore(format!("unknown segment {index}")))?;
        segment.apply(event, max_attempts)?;
        self.job.touch();
        Ok(())
    }

    pub fn all_completed(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(Segment::is_completed)
    }

    pub fn summary(&self) -> ProgressSummary {
        let count = |status: SegmentStatus| self.segments.iter().filter(|s| s.status == status).count();
        let total = self.segments.len();
        let completed = count(SegmentStatus::Completed);
        ProgressSummary {
            job_id: self.job.id.clone(),
            job_status: self.job.status,
            total,
            pending: count(SegmentStatus::Pending),
            encoding: count(SegmentStatus::Encoding),
            completed,
            failed: count(SegmentStatus::Failed),
            percent_complete: if total == 0 {
                0.0
            } else {
                completed as f64 * 100.0 / total as f64
            },
            updated_at: self.job.updated_at,
        }
    }
}
