// splicer-core/src/processing/crop_detection.rs
//
// Black bar detection. Only letterboxing (horizontal bars) is removed: the
// crop always keeps the full source width.

use crate::error::CoreResult;
use crate::external::{FrameSampler, FrameTags};
use crate::processing::video_properties::VideoProperties;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// cropdetect limit for SDR sources.
pub const SDR_CROP_THRESHOLD: u32 = 16;
/// Starting cropdetect limit for HDR sources, before black level refinement.
pub const HDR_CROP_THRESHOLD: u32 = 128;

const MIN_REFINED_THRESHOLD: u32 = 16;
const MAX_REFINED_THRESHOLD: u32 = 256;
const BLACK_LEVEL_MULTIPLIER: f64 = 1.5;

const SAMPLE_INTERVAL_SECS: f64 = 5.0;
const MIN_SAMPLES: u32 = 20;
const MIN_CROP_HEIGHT: u32 = 100;

const BLACK_LEVEL_TAG: &str = "lavfi.signalstats.YMIN";

/// A crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropResult {
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
}

impl CropResult {
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            x_offset: 0,
            y_offset: 0,
        }
    }

    pub fn is_full_frame(&self, width: u32, height: u32) -> bool {
        *self == Self::full_frame(width, height)
    }

    /// ffmpeg `crop` filter for this rectangle.
    pub fn to_filter(&self) -> String {
        format!(
            "crop={}:{}:{}:{}",
            self.width, self.height, self.x_offset, self.y_offset
        )
    }
}

/// Determines the initial crop detection threshold based on color properties.
/// Returns a tuple (crop_threshold, is_hdr).
fn determine_crop_threshold(props: &VideoProperties) -> (u32, bool) {
    if props.is_hdr() {
        log::info!("HDR content detected, adjusting detection sensitivity.");
        (HDR_CROP_THRESHOLD, true)
    } else {
        (SDR_CROP_THRESHOLD, false)
    }
}

/// Measures the black level of three fixed frames and derives the threshold from it.
fn refine_hdr_threshold<F: FrameSampler>(sampler: &F, input_file: &Path, initial_threshold: u32) -> u32 {
    let filter = "select='eq(n,0)+eq(n,100)+eq(n,200)',signalstats";

    let frames = match sampler.sample_frames(input_file, filter, Some(3)) {
        Ok(frames) => frames,
        Err(e) => {
            log::warn!("HDR black level sampling failed ({e}), using initial threshold: {initial_threshold}");
            return initial_threshold;
        }
    };

    match threshold_from_black_levels(&frames) {
        Some(threshold) => threshold,
        None => {
            log::warn!(
                "No black level measurements for {}. Using initial threshold.",
                input_file.display()
            );
            initial_threshold
        }
    }
}

/// 1.5x the average measured black level, clamped to `[16, 256]`.
pub fn threshold_from_black_levels(frames: &[FrameTags]) -> Option<u32> {
    let levels: Vec<f64> = frames
        .iter()
        .filter_map(|tags| tags.get(BLACK_LEVEL_TAG)?.parse::<f64>().ok())
        .collect();
    if levels.is_empty() {
        return None;
    }
    let average = levels.iter().sum::<f64>() / levels.len() as f64;
    let refined = (average * BLACK_LEVEL_MULTIPLIER).round() as u32;
    let clamped = refined.clamp(MIN_REFINED_THRESHOLD, MAX_REFINED_THRESHOLD);
    log::info!("HDR black level analysis: Avg={average:.1}, Refined Threshold={refined}, Clamped={clamped}");
    Some(clamped)
}

/// Calculates how much time (in seconds) to skip at the end for credits analysis avoidance.
pub fn calculate_credits_skip(duration: f64) -> f64 {
    if duration > 3600.0 {
        180.0
    } else if duration > 1200.0 {
        60.0
    } else if duration > 300.0 {
        30.0
    } else {
        0.0
    }
}

/// Interval between sampled frames and the number of samples for a window.
/// Short windows shrink the interval so at least 20 samples are taken.
pub fn sampling_plan(analysis_duration: f64) -> (f64, u32) {
    let natural = (analysis_duration / SAMPLE_INTERVAL_SECS).floor() as u32;
    if natural >= MIN_SAMPLES {
        (SAMPLE_INTERVAL_SECS, natural)
    } else {
        (analysis_duration / f64::from(MIN_SAMPLES), MIN_SAMPLES)
    }
}

fn parse_tag(tags: &FrameTags, key: &str) -> Option<u32> {
    tags.get(key)?.parse().ok()
}

/// Most frequent crop height among full-width candidates of at least 100px.
/// Ties resolve to the taller height.
pub fn most_common_height(frames: &[FrameTags], source_width: u32) -> Option<u32> {
    let mut histogram: BTreeMap<u32, usize> = BTreeMap::new();
    for tags in frames {
        let (Some(w), Some(h)) = (
            parse_tag(tags, "lavfi.cropdetect.w"),
            parse_tag(tags, "lavfi.cropdetect.h"),
        ) else {
            continue;
        };
        if w == source_width && h >= MIN_CROP_HEIGHT {
            *histogram.entry(h).or_insert(0) += 1;
        }
    }
    log::debug!("Crop height histogram: {histogram:?}");
    histogram
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(height, _)| height)
}

/// Converts a detected content height into a crop, ignoring bars of 1% or less.
pub fn crop_from_height(width: u32, orig_height: u32, common_height: u32) -> CropResult {
    if common_height >= orig_height {
        return CropResult::full_frame(width, orig_height);
    }
    let black_bar_size = (orig_height - common_height) / 2;
    let percent = black_bar_size * 100 / orig_height;
    if percent > 1 {
        CropResult {
            width,
            height: common_height,
            x_offset: 0,
            y_offset: black_bar_size,
        }
    } else {
        CropResult::full_frame(width, orig_height)
    }
}

/// Main crop detection function (entry point).
pub fn detect_crop<F: FrameSampler>(
    sampler: &F,
    input_file: &Path,
    video_props: &VideoProperties,
    duration_secs: f64,
    disable_crop: bool,
) -> CoreResult<CropResult> {
    let full = CropResult::full_frame(video_props.width, video_props.height);
    if disable_crop {
        log::info!("Crop detection disabled for {}", input_file.display());
        return Ok(full);
    }
    if video_props.width == 0 || video_props.height == 0 || duration_secs <= 0.0 {
        log::warn!(
            "Invalid dimensions or duration for crop detection: {}x{}, {}s",
            video_props.width,
            video_props.height,
            duration_secs
        );
        return Ok(full);
    }

    let (mut crop_threshold, is_hdr) = determine_crop_threshold(video_props);
    if is_hdr {
        log::info!("Running HDR black level analysis for {}...", input_file.display());
        crop_threshold = refine_hdr_threshold(sampler, input_file, crop_threshold);
    }

    let credits_skip = calculate_credits_skip(duration_secs);
    let analysis_duration = if duration_secs > credits_skip {
        duration_secs - credits_skip
    } else {
        duration_secs
    };
    if credits_skip > 0.0 {
        log::debug!(
            "Skipping last {credits_skip:.0}s for crop analysis (credits). Effective duration: {analysis_duration:.2}s"
        );
    }

    let (interval, samples) = sampling_plan(analysis_duration);
    let filter = format!(
        "trim=end={analysis_duration:.3},select='isnan(prev_selected_t)+gte(t-prev_selected_t,{interval:.3})',cropdetect=limit={crop_threshold}:round=2:reset=1"
    );

    log::info!(
        "Running crop detection on {} ({}x{}, threshold {crop_threshold}, {samples} samples every {interval:.2}s)",
        input_file.display(),
        video_props.width,
        video_props.height
    );
    let frames = match sampler.sample_frames(input_file, &filter, Some(samples * 2)) {
        Ok(frames) => frames,
        Err(e) => {
            log::warn!("Crop detection failed for {} ({e}), using full frame", input_file.display());
            return Ok(full);
        }
    };

    let Some(common_height) = most_common_height(&frames, video_props.width) else {
        log::info!(
            "No valid crop values detected. Using full dimensions for {}.",
            input_file.display()
        );
        return Ok(full);
    };

    let crop = crop_from_height(video_props.width, video_props.height, common_height);
    if crop.is_full_frame(video_props.width, video_props.height) {
        log::info!("No cropping needed for {}.", input_file.display());
    } else {
        log::info!("Detected crop for {}: {}", input_file.display(), crop.to_filter());
    }
    Ok(crop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop_tags(w: u32, h: u32) -> FrameTags {
        FrameTags::from([
            ("lavfi.cropdetect.w".to_string(), w.to_string()),
            ("lavfi.cropdetect.h".to_string(), h.to_string()),
            ("lavfi.cropdetect.x".to_string(), "0".to_string()),
            ("lavfi.cropdetect.y".to_string(), ((1080 - h) / 2).to_string()),
        ])
    }

    #[test]
    fn test_credits_skip() {
        assert_eq!(calculate_credits_skip(7200.0), 180.0);
        assert_eq!(calculate_credits_skip(1800.0), 60.0);
        assert_eq!(calculate_credits_skip(600.0), 30.0);
        assert_eq!(calculate_credits_skip(120.0), 0.0);
        assert_eq!(calculate_credits_skip(3600.0), 60.0);
    }

    #[test]
    fn test_sampling_plan_forces_minimum_samples() {
        assert_eq!(sampling_plan(1000.0), (5.0, 200));
        let (interval, samples) = sampling_plan(40.0);
        assert_eq!(samples, 20);
        assert!((interval - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_histogram_ignores_narrow_and_tiny_candidates() {
        let frames = vec![
            crop_tags(1920, 800),
            crop_tags(1920, 800),
            crop_tags(1440, 1080),
            crop_tags(1440, 1080),
            crop_tags(1440, 1080),
            crop_tags(1920, 64),
            crop_tags(1920, 64),
            crop_tags(1920, 64),
            crop_tags(1920, 1080),
        ];
        assert_eq!(most_common_height(&frames, 1920), Some(800));
    }

    #[test]
    fn test_histogram_tie_prefers_taller() {
        let frames = vec![crop_tags(1920, 800), crop_tags(1920, 816)];
        assert_eq!(most_common_height(&frames, 1920), Some(816));
    }

    #[test]
    fn test_crop_from_height() {
        assert_eq!(
            crop_from_height(1920, 1080, 800),
            CropResult {
                width: 1920,
                height: 800,
                x_offset: 0,
                y_offset: 140
            }
        );
        // 10px bars are under 1% of 1080.
        assert!(crop_from_height(1920, 1080, 1060).is_full_frame(1920, 1080));
        assert!(crop_from_height(1920, 1080, 1080).is_full_frame(1920, 1080));
    }

    #[test]
    fn test_black_level_threshold_is_clamped() {
        let level = |v: &str| FrameTags::from([(BLACK_LEVEL_TAG.to_string(), v.to_string())]);
        assert_eq!(threshold_from_black_levels(&[level("64"), level("64")]), Some(96));
        assert_eq!(threshold_from_black_levels(&[level("4")]), Some(16));
        assert_eq!(threshold_from_black_levels(&[level("900")]), Some(256));
        assert_eq!(threshold_from_black_levels(&[FrameTags::new()]), None);
    }

    #[test]
    fn test_filter_string() {
        assert_eq!(
            CropResult {
                width: 1920,
                height: 800,
                x_offset: 0,
                y_offset: 140
            }
            .to_filter(),
            "crop=1920:800:0:140"
        );
    }
}
