//! Configuration structures and constants for the splicer-core library.
//!
//! This module provides the configuration for a transcode job: the quality
//! target and encoder parameters handed to ab-av1, segmentation and sampling
//! settings, worker pool sizing and the per-attempt timeout.

mod builder;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub use builder::CoreConfigBuilder;

// Default constants

/// Default VMAF floor handed to the encoder's quality search.
pub const DEFAULT_TARGET_VMAF: f32 = 93.0;

/// Default encoder preset (0-13, lower is slower/better quality)
/// Value 6 provides a good balance between speed and quality.
pub const DEFAULT_ENCODER_PRESET: u8 = 6;

/// Highest preset accepted by libsvtav1.
pub const MAX_ENCODER_PRESET: u8 = 13;

/// SVT-AV1 parameters passed through `--svt`.
pub const DEFAULT_SVT_PARAMS: &str = "tune=0:enable-qm=1:enable-overlays=1";

/// VMAF model options passed through `--vmaf`.
pub const DEFAULT_VMAF_OPTIONS: &str = "n_subsample=8:pool=perc5_min";

pub const DEFAULT_KEYINT: &str = "10s";

pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p10le";

/// Number of samples the encoder takes per quality search on the first rung.
pub const DEFAULT_SAMPLE_COUNT: u32 = 3;

/// Length in seconds of each quality-search sample on the first rung.
pub const DEFAULT_SAMPLE_DURATION_SECS: u32 = 1;

/// Segment length in seconds used by the segmenter.
pub const DEFAULT_SEGMENT_LENGTH_SECS: f64 = 15.0;

/// Per-attempt encode timeout. A single 15s segment should never get close.
pub const DEFAULT_ENCODE_TIMEOUT_SECS: u64 = 2 * 60 * 60;

/// Default root for per-job working directories.
pub const DEFAULT_WORK_DIR: &str = "splicer-work";

/// Main configuration structure for the splicer-core library.
///
/// Created by the consumer of the library (e.g., splicer-cli) and passed to
/// [`crate::Pipeline`]. All fields have sensible defaults.
///
/// # Examples
///
/// ```rust
/// use splicer_core::config::CoreConfigBuilder;
///
/// let config = CoreConfigBuilder::new()
///     .work_dir("/tmp/splicer")
///     .target_vmaf(95.0)
///     .max_workers(4)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Root directory under which each job gets its own working tree.
    pub work_dir: PathBuf,

    pub target_vmaf: f32,
    pub preset: u8,
    pub svt_params: String,
    pub vmaf_options: String,
    pub keyint: String,
    pub pixel_format: String,

    pub sample_count: u32,
    pub sample_duration_secs: u32,

    pub segment_length_secs: f64,

    /// Skip crop analysis and always encode the full frame.
    pub disable_crop: bool,

    /// Worker pool size. `None` uses the detected CPU count.
    pub max_workers: Option<usize>,

    /// Timeout for a single encode attempt. `None` disables it.
    pub encode_timeout_secs: Option<u64>,

    /// Keep the working directory after a successful job.
    pub keep_workspace: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            target_vmaf: DEFAULT_TARGET_VMAF,
            preset: DEFAULT_ENCODER_PRESET,
            svt_params: DEFAULT_SVT_PARAMS.to_string(),
            vmaf_options: DEFAULT_VMAF_OPTIONS.to_string(),
            keyint: DEFAULT_KEYINT.to_string(),
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            sample_count: DEFAULT_SAMPLE_COUNT,
            sample_duration_secs: DEFAULT_SAMPLE_DURATION_SECS,
            segment_length_secs: DEFAULT_SEGMENT_LENGTH_SECS,
            disable_crop: false,
            max_workers: None,
            encode_timeout_secs: Some(DEFAULT_ENCODE_TIMEOUT_SECS),
            keep_workspace: false,
        }
    }
}

impl CoreConfig {
    /// Effective worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.max_workers.unwrap_or_else(num_cpus::get)
    }

    #[must_use]
    pub fn encode_timeout(&self) -> Option<Duration> {
        self.encode_timeout_secs.map(Duration::from_secs)
    }

    /// Checks the configuration for values that would make every job fail.
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.target_vmaf > 0.0 && self.target_vmaf <= 100.0) {
            return Err(CoreError::Config(format!(
                "target VMAF must be in (0, 100], got {}",
                self.target_vmaf
            )));
        }
        if self.target_vmaf - crate::encoding::ladder::LOWER_VMAF_DELTA <= 0.0 {
            return Err(CoreError::Config(format!(
                "target VMAF {} leaves no room for the lowered retry floor",
                self.target_vmaf
            )));
        }
        if self.preset > MAX_ENCODER_PRESET {
            return Err(CoreError::Config(format!(
                "preset must be 0-{MAX_ENCODER_PRESET}, got {}",
                self.preset
            )));
        }
        if !(self.segment_length_secs > 0.0 && self.segment_length_secs.is_finite()) {
            return Err(CoreError::Config(format!(
                "segment length must be positive, got {}",
                self.segment_length_secs
            )));
        }
        if self.sample_count == 0 || self.sample_duration_secs == 0 {
            return Err(CoreError::Config(
                "sample count and sample duration must be non-zero".to_string(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(CoreError::Config("worker count must be non-zero".to_string()));
        }
        if self.encode_timeout_secs == Some(0) {
            return Err(CoreError::Config("encode timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}
