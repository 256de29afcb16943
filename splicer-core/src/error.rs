// ============================================================================
// splicer-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Custom Error Types for Splicer Core
//
// This module defines the error type used throughout the core library. Every
// component returns a typed `CoreError` to its caller instead of a raw exit
// code, and each variant knows which pipeline stage it belongs to so the
// recovery manager can record where a job died.
//
// KEY COMPONENTS:
// - CoreError: enum covering every failure class of a job
// - CoreResult: convenience result alias
// - command_*_error: helpers for external process failures

use crate::state::JobStage;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Custom error type for the core library.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to start {0}: {1}")]
    CommandStart(String, io::Error),

    #[error("Failed to wait for {0}: {1}")]
    CommandWait(String, io::Error),

    #[error("{0} failed ({1}): {2}")]
    CommandFailed(String, ExitStatus, String),

    #[error("{command} timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("{0} was cancelled")]
    Cancelled(String),

    #[error("Failed to parse ffprobe output: {0}")]
    FfprobeParse(String),

    #[error("No video stream found in {0}")]
    NoStreamsFound(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Required tool '{0}' was not found or is not runnable")]
    MissingDependency(String),

    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    #[error("Segment {path} is invalid: {reason}")]
    SegmentValidation { path: PathBuf, reason: String },

    #[error("Segment {index} has used all {max} encode attempts")]
    AttemptsExhausted { index: usize, max: usize },

    #[error("{count} segment(s) failed to encode, first failure at segment {first_index}")]
    SegmentsFailed { first_index: usize, count: usize },

    #[error("Cannot concatenate: segment {0} is not completed")]
    IncompleteSegments(usize),

    #[error("Concatenation failed: {0}")]
    Concatenation(String),

    #[error("Muxing failed: {0}")]
    Mux(String),

    #[error("Output validation failed: {0}")]
    Validation(String),

    #[error("State store error: {0}")]
    StateStore(String),
}

impl CoreError {
    /// Pipeline stage this error is attributed to when nothing more
    /// specific is known by the caller.
    pub fn stage(&self) -> JobStage {
        match self {
            CoreError::InvalidInput(_) | CoreError::Config(_) | CoreError::MissingDependency(_) => {
                JobStage::Validation
            }
            CoreError::FfprobeParse(_) | CoreError::NoStreamsFound(_) => JobStage::Analysis,
            CoreError::Segmentation(_) | CoreError::SegmentValidation { .. } => {
                JobStage::Segmentation
            }
            CoreError::AttemptsExhausted { .. }
            | CoreError::SegmentsFailed { .. }
            | CoreError::Timeout { .. }
            | CoreError::Cancelled(_) => JobStage::Encode,
            CoreError::IncompleteSegments(_) | CoreError::Concatenation(_) => {
                JobStage::Concatenation
            }
            CoreError::Mux(_) | CoreError::Validation(_) => JobStage::Mux,
            CoreError::StateStore(_) => JobStage::State,
            CoreError::Io(_)
            | CoreError::Json(_)
            | CoreError::CommandStart(..)
            | CoreError::CommandWait(..)
            | CoreError::CommandFailed(..) => JobStage::Unknown,
        }
    }

    /// Index of the segment this error concerns, if any.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            CoreError::AttemptsExhausted { index, .. } => Some(*index),
            CoreError::SegmentsFailed { first_index, .. } => Some(*first_index),
            CoreError::IncompleteSegments(index) => Some(*index),
            _ => None,
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

pub fn command_start_error(command: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandStart(command.into(), err)
}

pub fn command_wait_error(command: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandWait(command.into(), err)
}

pub fn command_failed_error(
    command: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed(command.into(), status, stderr.into())
}
