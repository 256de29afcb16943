// ============================================================================
// splicer-core/src/workspace.rs
// ============================================================================
//
// JOB WORKSPACE: Per-Job Working Directory Layout
//
// Every job gets a directory under the configured work dir, named after the
// input file so an interrupted job is found again on the next run. A short
// digest of the canonical input path keeps inputs that share a stem apart:
//
//   <work_dir>/<input stem>-<digest>/
//     segments/0000.mkv ...        stream-copied source segments
//     encoded/0000.mkv ...         finished segment encodes
//     encoded/0000.attempt.mkv     in-flight attempt output
//     audio/track_0.mkv ...        Opus tracks
//     data/                        state documents
//     concat.txt, video.mkv        reassembly
//
// Cleanup records and archived job manifests live beside the job dirs so
// they survive workspace removal.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::CoreResult;
use crate::utils::sanitized_stem;

const ATTEMPT_MARKER: &str = ".attempt.";

/// Bytes of the path digest used in workspace names.
const PATH_DIGEST_BYTES: usize = 4;

/// Filesystem layout of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Workspace for `input` under `work_dir`. Nothing is created yet.
    pub fn for_input(work_dir: &Path, input: &Path) -> Self {
        let input = canonical_input(input);
        let name = format!("{}-{}", sanitized_stem(&input), path_digest(&input));
        Self {
            root: work_dir.join(name),
        }
    }

    pub fn create(&self) -> CoreResult<()> {
        for dir in [
            self.segments_dir(),
            self.encoded_dir(),
            self.audio_dir(),
            self.data_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn remove(&self) -> CoreResult<()> {
        if self.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join("segments")
    }

    pub fn encoded_dir(&self) -> PathBuf {
        self.root.join("encoded")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn concat_list(&self) -> PathBuf {
        self.root.join("concat.txt")
    }

    /// Encoded video stream before muxing (either path).
    pub fn video_output(&self) -> PathBuf {
        self.root.join("video.mkv")
    }

    /// Scratch output for a single-pass encode of the whole file.
    pub fn video_attempt(&self) -> PathBuf {
        self.root.join("video.attempt.mkv")
    }

    /// ffmpeg segment muxer output pattern.
    pub fn segment_pattern(&self) -> PathBuf {
        self.segments_dir().join("%04d.mkv")
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.segments_dir().join(format!("{index:04}.mkv"))
    }

    pub fn encoded_path(&self, index: usize) -> PathBuf {
        self.encoded_dir().join(format!("{index:04}.mkv"))
    }

    pub fn attempt_path(&self, index: usize) -> PathBuf {
        self.encoded_dir().join(format!("{index:04}.attempt.mkv"))
    }
}

/// Canonical form of an input path. Paths that do not exist yet are only
/// made absolute.
pub fn canonical_input(input: &Path) -> PathBuf {
    fs::canonicalize(input)
        .or_else(|_| std::path::absolute(input))
        .unwrap_or_else(|_| input.to_path_buf())
}

fn path_digest(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    digest[..PATH_DIGEST_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Directory holding cleanup records for all jobs under `work_dir`.
pub fn recovery_dir(work_dir: &Path) -> PathBuf {
    work_dir.join("recovery")
}

/// Directory holding archived manifests of finished jobs.
pub fn archive_dir(work_dir: &Path) -> PathBuf {
    work_dir.join("jobs")
}

/// True for per-attempt scratch files.
pub fn is_attempt_artifact(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(ATTEMPT_MARKER))
        .unwrap_or(false)
}
