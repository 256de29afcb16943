//! Content classification: picks the encode path for a job.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::processing::video_properties::VideoProperties;

/// Encode path for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeStrategy {
    /// Single-pass encode of the whole file; DV metadata cannot survive chunking.
    DolbyVision,
    /// Segment, encode in parallel, concatenate.
    Chunked,
}

impl fmt::Display for EncodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeStrategy::DolbyVision => f.write_str("dolby_vision"),
            EncodeStrategy::Chunked => f.write_str("chunked"),
        }
    }
}

/// Dolby Vision content takes the single-pass path, everything else is chunked.
pub fn classify(video: &VideoProperties) -> EncodeStrategy {
    if video.dolby_vision {
        log::info!("Dolby Vision metadata detected, using single-pass encode");
        EncodeStrategy::DolbyVision
    } else {
        EncodeStrategy::Chunked
    }
}
