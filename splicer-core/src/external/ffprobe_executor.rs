//! FFprobe integration for media analysis.
//!
//! [`MediaProber`] is the seam the rest of the crate probes through.
//! [`FfprobeCli`] runs `ffprobe -print_format json` and deserializes the
//! result into a [`MediaInfo`].

use crate::error::{CoreError, CoreResult};
use crate::external::command::run_command;
use crate::processing::video_properties::VideoProperties;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Audio stream summary used for transcoding and mux validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    /// Absolute stream index in the container.
    pub index: usize,
    pub codec_name: String,
    pub channels: u32,
}

/// Everything the pipeline needs to know about a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub format_name: String,
    pub size_bytes: Option<u64>,
    pub video: VideoProperties,
    pub audio_streams: Vec<AudioStreamInfo>,
    pub subtitle_count: usize,
    pub attachment_count: usize,
    pub chapter_count: usize,
}

/// Probes media files.
pub trait MediaProber {
    fn probe(&self, path: &Path) -> CoreResult<MediaInfo>;
}

/// `MediaProber` backed by the ffprobe binary.
#[derive(Debug, Clone)]
pub struct FfprobeCli {
    binary: PathBuf,
}

impl Default for FfprobeCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl MediaProber for FfprobeCli {
    fn probe(&self, path: &Path) -> CoreResult<MediaInfo> {
        log::debug!("Probing {}", path.display());
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-show_chapters",
        ])
        .arg(path);

        let output = run_command(&mut cmd)?;
        let json = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(path, &json)
    }
}

// --- ffprobe JSON schema (only the fields we read) ---

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
    #[serde(default)]
    chapters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_tag_string: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    color_transfer: Option<String>,
    color_primaries: Option<String>,
    color_space: Option<String>,
    r_frame_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
    disposition: Option<Disposition>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    side_data_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Disposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
    size: Option<String>,
}

const DV_CODEC_TAGS: &[&str] = &["dvh1", "dvhe", "dav1"];

impl ProbeStream {
    fn kind(&self) -> &str {
        self.codec_type.as_deref().unwrap_or("")
    }

    fn is_cover_art(&self) -> bool {
        self.disposition.as_ref().is_some_and(|d| d.attached_pic == 1)
    }

    fn has_dolby_vision(&self) -> bool {
        let record = self.side_data_list.iter().any(|sd| {
            sd.side_data_type
                .as_deref()
                .is_some_and(|t| t.contains("DOVI configuration record"))
        });
        let tag = self
            .codec_tag_string
            .as_deref()
            .is_some_and(|t| DV_CODEC_TAGS.contains(&t));
        record || tag
    }
}

fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

/// Parses `ffprobe -print_format json` output for `path`.
pub fn parse_probe_output(path: &Path, json: &str) -> CoreResult<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| CoreError::FfprobeParse(format!("{}: {e}", path.display())))?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.kind() == "video" && !s.is_cover_art())
        .ok_or_else(|| CoreError::NoStreamsFound(path.to_path_buf()))?;

    let video = VideoProperties {
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        codec_name: video_stream.codec_name.clone().unwrap_or_default(),
        color_transfer: video_stream.color_transfer.clone(),
        color_primaries: video_stream.color_primaries.clone(),
        color_space: video_stream.color_space.clone(),
        frame_rate: video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate),
        dolby_vision: video_stream.has_dolby_vision(),
    };

    let format = probe.format.as_ref();
    let duration_secs = format
        .and_then(|f| f.duration.as_deref())
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| {
            CoreError::FfprobeParse(format!("{}: no usable duration", path.display()))
        })?;

    let audio_streams = probe
        .streams
        .iter()
        .filter(|s| s.kind() == "audio")
        .map(|s| AudioStreamInfo {
            index: s.index,
            codec_name: s.codec_name.clone().unwrap_or_default(),
            channels: s.channels.unwrap_or(2),
        })
        .collect();

    Ok(MediaInfo {
        duration_secs,
        format_name: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default(),
        size_bytes: format.and_then(|f| f.size.as_deref()).and_then(|s| s.parse().ok()),
        video,
        audio_streams,
        subtitle_count: probe.streams.iter().filter(|s| s.kind() == "subtitle").count(),
        attachment_count: probe
            .streams
            .iter()
            .filter(|s| s.kind() == "attachment")
            .count(),
        chapter_count: probe.chapters.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HDR_DV_SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "hevc", "codec_tag_string": "[0][0][0][0]",
             "width": 3840, "height": 2160, "color_transfer": "smpte2084", "color_primaries": "bt2020",
             "color_space": "bt2020nc", "r_frame_rate": "24000/1001",
             "side_data_list": [{"side_data_type": "DOVI configuration record"}]},
            {"index": 1, "codec_type": "audio", "codec_name": "truehd", "channels": 8},
            {"index": 2, "codec_type": "audio", "codec_name": "ac3", "channels": 6},
            {"index": 3, "codec_type": "subtitle", "codec_name": "hdmv_pgs_subtitle"},
            {"index": 4, "codec_type": "attachment", "codec_name": "ttf"}
        ],
        "format": {"duration": "7265.123000", "format_name": "matroska,webm", "size": "1000000"},
        "chapters": [{"id": 0}, {"id": 1}]
    }"#;

    #[test]
    fn test_parse_full_probe() {
        let info = parse_probe_output(Path::new("movie.mkv"), HDR_DV_SAMPLE).unwrap();
        assert_eq!(info.video.width, 3840);
        assert_eq!(info.video.height, 2160);
        assert!(info.video.dolby_vision);
        assert!(info.video.is_hdr());
        assert!((info.video.frame_rate.unwrap() - 23.976).abs() < 0.001);
        assert!((info.duration_secs - 7265.123).abs() < 1e-6);
        assert_eq!(info.audio_streams.len(), 2);
        assert_eq!(info.audio_streams[0].channels, 8);
        assert_eq!(info.audio_streams[1].index, 2);
        assert_eq!(info.subtitle_count, 1);
        assert_eq!(info.attachment_count, 1);
        assert_eq!(info.chapter_count, 2);
        assert_eq!(info.size_bytes, Some(1_000_000));
    }

    #[test]
    fn test_dv_codec_tag_is_detected() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "video", "codec_name": "hevc",
            "codec_tag_string": "dvh1", "width": 1920, "height": 1080}],
            "format": {"duration": "10.0"}}"#;
        let info = parse_probe_output(Path::new("dv.mp4"), json).unwrap();
        assert!(info.video.dolby_vision);
    }

    #[test]
    fn test_cover_art_is_not_primary_video() {
        let json = r#"{"streams": [
            {"index": 0, "codec_type": "video", "codec_name": "mjpeg", "width": 600, "height": 600,
             "disposition": {"attached_pic": 1}},
            {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
        ], "format": {"duration": "60"}}"#;
        let info = parse_probe_output(Path::new("a.mkv"), json).unwrap();
        assert_eq!(info.video.codec_name, "h264");
        assert!(!info.video.dolby_vision);
    }

    #[test]
    fn test_missing_video_stream_is_an_error() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "audio", "channels": 2}],
            "format": {"duration": "60"}}"#;
        assert!(matches!(
            parse_probe_output(Path::new("a.flac"), json),
            Err(CoreError::NoStreamsFound(_))
        ));
    }

    #[test]
    fn test_missing_duration_is_an_error() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "video", "width": 10, "height": 10}],
            "format": {}}"#;
        assert!(matches!(
            parse_probe_output(Path::new("a.mkv"), json),
            Err(CoreError::FfprobeParse(_))
        ));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(
            parse_probe_output(Path::new("a.mkv"), "not json"),
            Err(CoreError::FfprobeParse(_))
        ));
    }
}
