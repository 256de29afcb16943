//! Source analysis ahead of encoding.
//!
//! Probing results are turned into an encode strategy, an HDR-aware crop
//! rectangle and per-track audio settings.

/// Probe + classify + crop, bundled into an immutable result
pub mod analysis;

/// Opus transcoding of source audio tracks
pub mod audio;

/// Dolby Vision vs chunked path selection
pub mod classify;

/// Black bar detection
pub mod crop_detection;

/// Video stream properties
pub mod video_properties;

pub use analysis::{AnalysisResult, analyze};
pub use classify::{EncodeStrategy, classify};
pub use crop_detection::{CropResult, detect_crop};
pub use video_properties::VideoProperties;
