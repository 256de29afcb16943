//! Core library for chunked AV1/Opus transcoding using ffmpeg, ffprobe and ab-av1.
//!
//! This crate probes a source, picks between a single-pass Dolby Vision encode
//! and a segmented parallel encode, walks every segment up a quality retry
//! ladder, reassembles the result with Opus audio and keeps a crash-safe job
//! ledger so interrupted jobs resume where they stopped.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use splicer_core::config::CoreConfigBuilder;
//! use splicer_core::encoding::{AbAv1Encoder, Pipeline};
//! use splicer_core::external::{FfprobeCli, FfprobeFrameSampler, SidecarSpawner};
//! use std::path::Path;
//!
//! let config = CoreConfigBuilder::new()
//!     .work_dir("/tmp/splicer")
//!     .target_vmaf(93.0)
//!     .build();
//! config.validate().unwrap();
//!
//! let spawner = SidecarSpawner;
//! let prober = FfprobeCli::new();
//! let sampler = FfprobeFrameSampler::new();
//! let encoder = AbAv1Encoder::new();
//!
//! let mut pipeline = Pipeline::new(&config, &spawner, &prober, &sampler, &encoder);
//! let report = pipeline
//!     .run_job(Path::new("/media/film.mkv"), Path::new("/media/out/film.mkv"))
//!     .unwrap();
//! println!("{} segments encoded", report.segment_count);
//! ```

pub mod config;
pub mod encoding;
pub mod error;
pub mod external;
pub mod file_logging;
pub mod processing;
pub mod recovery;
pub mod state;
pub mod utils;
pub mod workspace;

// Re-exports for public API
pub use config::{CoreConfig, CoreConfigBuilder};
pub use encoding::{JobReport, Pipeline};
pub use error::{CoreError, CoreResult};
pub use external::{check_dependency, check_required_tools};
pub use processing::{AnalysisResult, CropResult, EncodeStrategy};
pub use recovery::{CleanupRecord, RecoveryManager};
pub use state::{JobStatus, ProgressSummary, StateStore};
pub use utils::{calculate_size_reduction, format_bytes, format_duration};
pub use workspace::JobWorkspace;
