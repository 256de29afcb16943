// ============================================================================
// splicer-core/src/state/store.rs
// ============================================================================
//
// STATE STORE: Durable JSON Documents for One Job
//
// Persists the job ledger as four documents under the job's `data/`
// directory. Every write goes to a temporary file that is fsynced and then
// renamed over the target, so a crash leaves either the old or the new
// document, never a torn one. Transient I/O failures are retried before the
// error is surfaced.
//
// The store is not synchronized; it is owned by the state actor thread.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::model::{AttemptRecord, Job, JobLedger, ProgressSummary, Segment, SegmentStatus};
use crate::encoding::ladder::StrategyKind;
use crate::error::{CoreError, CoreResult};

pub const JOB_DOCUMENT: &str = "job.json";
pub const SEGMENT_MANIFEST_DOCUMENT: &str = "segments.json";
pub const STATUS_DOCUMENT: &str = "status.json";
pub const PROGRESS_DOCUMENT: &str = "progress.json";

/// Attempts per document write before giving up.
const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize, Deserialize)]
struct SegmentManifest {
    job_id: String,
    updated_at: DateTime<Utc>,
    segments: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    index: usize,
    path: PathBuf,
    size_bytes: u64,
    start_time: f64,
    duration: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusDocument {
    job_id: String,
    updated_at: DateTime<Utc>,
    segments: Vec<StatusEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusEntry {
    index: usize,
    status: SegmentStatus,
    attempts: u32,
    last_strategy: Option<StrategyKind>,
    error: Option<String>,
    history: Vec<AttemptRecord>,
    updated_at: DateTime<Utc>,
}

/// File-backed persistence for one job's ledger.
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    /// Opens (and creates if needed) the store rooted at `data_dir`.
    pub fn open(data_dir: &Path) -> CoreResult<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn save_job(&self, job: &Job) -> CoreResult<()> {
        self.write_document(JOB_DOCUMENT, job)
    }

    pub fn save_segment_manifest(&self, ledger: &JobLedger) -> CoreResult<()> {
        let manifest = SegmentManifest {
            job_id: ledger.job.id.clone(),
            updated_at: Utc::now(),
            segments: ledger
                .segments
                .iter()
                .map(|s| ManifestEntry {
                    index: s.index,
                    path: s.path.clone(),
                    size_bytes: s.size_bytes,
                    start_time: s.start_time,
                    duration: s.duration,
                })
                .collect(),
        };
        self.write_document(SEGMENT_MANIFEST_DOCUMENT, &manifest)
    }

    pub fn save_status(&self, ledger: &JobLedger) -> CoreResult<()> {
        let status = StatusDocument {
            job_id: ledger.job.id.clone(),
            updated_at: Utc::now(),
            segments: ledger
                .segments
                .iter()
                .map(|s| StatusEntry {
                    index: s.index,
                    status: s.status,
                    attempts: s.attempts,
                    last_strategy: s.last_strategy,
                    error: s.error.clone(),
                    history: s.history.clone(),
                    updated_at: s.updated_at,
                })
                .collect(),
        };
        self.write_document(STATUS_DOCUMENT, &status)
    }

    pub fn save_progress(&self, summary: &ProgressSummary) -> CoreResult<()> {
        self.write_document(PROGRESS_DOCUMENT, summary)
    }

    /// Writes every document.
    pub fn save_all(&self, ledger: &JobLedger) -> CoreResult<()> {
        self.save_job(&ledger.job)?;
        self.save_segment_manifest(ledger)?;
        self.save_status(ledger)?;
        self.save_progress(&ledger.summary())
    }

    /// Loads a previously persisted ledger, or `None` if no job was saved here.
    pub fn load(&self) -> CoreResult<Option<JobLedger>> {
        let Some(job) = self.read_document::<Job>(JOB_DOCUMENT)? else {
            return Ok(None);
        };
        let mut ledger = JobLedger::new(job);

        let Some(manifest) = self.read_document::<SegmentManifest>(SEGMENT_MANIFEST_DOCUMENT)?
        else {
            return Ok(Some(ledger));
        };
        if manifest.job_id != ledger.job.id {
            return Err(CoreError::StateStore(format!(
                "segment manifest belongs to job {} but job document is {}",
                manifest.job_id, ledger.job.id
            )));
        }

        let mut statuses = self
            .read_document::<StatusDocument>(STATUS_DOCUMENT)?
            .map(|doc| doc.segments)
            .unwrap_or_default();

        for entry in manifest.segments {
            let mut segment = Segment::new(
                entry.index,
                entry.path,
                entry.size_bytes,
                entry.start_time,
                entry.duration,
            );
            if let Some(pos) = statuses.iter().position(|s| s.index == entry.index) {
                let status = statuses.swap_remove(pos);
                segment.status = status.status;
                segment.attempts = status.attempts;
                segment.last_strategy = status.last_strategy;
                segment.error = status.error;
                segment.history = status.history;
                segment.updated_at = status.updated_at;
            }
            ledger.segments.push(segment);
        }
        ledger.segments.sort_by_key(|s| s.index);
        Ok(Some(ledger))
    }

    /// Reads the progress summary without loading the full ledger.
    pub fn load_progress(&self) -> CoreResult<Option<ProgressSummary>> {
        self.read_document(PROGRESS_DOCUMENT)
    }

    fn read_document<T: DeserializeOwned>(&self, name: &str) -> CoreResult<Option<T>> {
        let path = self.data_dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let value = serde_json::from_str(&content).map_err(|e| {
            CoreError::StateStore(format!("corrupt state document {}: {e}", path.display()))
        })?;
        Ok(Some(value))
    }

    fn write_document<T: Serialize>(&self, name: &str, value: &T) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let target = self.data_dir.join(name);

        let mut last_error = None;
        for attempt in 1..=WRITE_ATTEMPTS {
            match write_atomic(&target, &bytes) {
                Ok(()) => {
                    debug!("Persisted {}", target.display());
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Write of {} failed (attempt {attempt}/{WRITE_ATTEMPTS}): {e}",
                        target.display()
                    );
                    last_error = Some(e);
                    if attempt < WRITE_ATTEMPTS {
                        thread::sleep(WRITE_BACKOFF * attempt);
                    }
                }
            }
        }

        Err(CoreError::StateStore(format!(
            "failed to write {} after {WRITE_ATTEMPTS} attempts: {}",
            target.display(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

/// Writes `bytes` to `<target>.tmp`, syncs it and renames it over `target`.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = target.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, target)
}
