//! Pre-encode analysis.
//!
//! Everything the encode and mux stages need to know about the source is
//! computed once here and carried as an immutable [`AnalysisResult`].

use crate::error::CoreResult;
use crate::external::{FrameSampler, MediaInfo, MediaProber};
use crate::processing::classify::{EncodeStrategy, classify};
use crate::processing::crop_detection::{CropResult, detect_crop};
use crate::utils::format_duration;
use std::path::Path;

/// Result of probing, classifying and crop-analyzing a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub media: MediaInfo,
    pub strategy: EncodeStrategy,
    pub is_hdr: bool,
    pub crop: CropResult,
}

impl AnalysisResult {
    /// `crop=...` filter, or `None` when the full frame is kept.
    pub fn crop_filter(&self) -> Option<String> {
        let video = &self.media.video;
        if self.crop.is_full_frame(video.width, video.height) {
            None
        } else {
            Some(self.crop.to_filter())
        }
    }

    pub fn is_dolby_vision(&self) -> bool {
        self.strategy == EncodeStrategy::DolbyVision
    }
}

/// Probes `input` and derives the encode strategy and crop.
///
/// A probe failure is fatal. Crop analysis only runs on the chunked path;
/// Dolby Vision sources are encoded full frame.
pub fn analyze<P: MediaProber, F: FrameSampler>(
    prober: &P,
    sampler: &F,
    input: &Path,
    disable_crop: bool,
) -> CoreResult<AnalysisResult> {
    let media = prober.probe(input)?;
    let video = &media.video;
    let is_hdr = video.is_hdr();
    log::info!(
        "Source: {}x{} {}, {}, HDR: {}, audio tracks: {}",
        video.width,
        video.height,
        video.codec_name,
        format_duration(media.duration_secs),
        is_hdr,
        media.audio_streams.len()
    );

    let strategy = classify(video);
    let crop = match strategy {
        EncodeStrategy::Chunked => {
            detect_crop(sampler, input, video, media.duration_secs, disable_crop)?
        }
        EncodeStrategy::DolbyVision => CropResult::full_frame(video.width, video.height),
    };

    Ok(AnalysisResult {
        media,
        strategy,
        is_hdr,
        crop,
    })
}
