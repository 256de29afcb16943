// ============================================================================
// splicer-core/src/encoding/muxer.rs
// ============================================================================
//
// MUXER: Final Container Assembly and Validation
//
// Combines the encoded video, the transcoded Opus tracks and everything the
// source carries verbatim (subtitles, attachments, chapters, metadata) into
// the output container with a single stream-copy ffmpeg run. The result is
// probed again and checked against the source before the job may complete.

use std::fs;
use std::path::{Path, PathBuf};

use ffmpeg_sidecar::command::FfmpegCommand;
use log::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegSpawner, MediaInfo, MediaProber, run_ffmpeg};

/// Allowed difference between output and source duration.
pub const DURATION_TOLERANCE_SECS: f64 = 1.0;

const EXPECTED_VIDEO_CODEC: &str = "av1";
const EXPECTED_AUDIO_CODEC: &str = "opus";

/// Inputs of one mux run.
#[derive(Debug, Clone)]
pub struct MuxInputs<'a> {
    pub video: &'a Path,
    pub audio_tracks: &'a [PathBuf],
    /// Original file; subtitles, attachments and chapters come from here.
    pub source: &'a Path,
}

/// ffmpeg arguments for the final mux.
///
/// Input order is video, then each audio track file, then the source.
pub fn mux_args(inputs: &MuxInputs<'_>, output: &Path) -> Vec<String> {
    let mut args = vec!["-hide_banner".to_string()];
    args.push("-i".to_string());
    args.push(inputs.video.to_string_lossy().into_owned());
    for track in inputs.audio_tracks {
        args.push("-i".to_string());
        args.push(track.to_string_lossy().into_owned());
    }
    args.push("-i".to_string());
    args.push(inputs.source.to_string_lossy().into_owned());

    let source = inputs.audio_tracks.len() + 1;

    args.extend(["-map".to_string(), "0:v:0".to_string()]);
    for input in 1..source {
        args.extend(["-map".to_string(), format!("{input}:a:0")]);
    }
    args.extend([
        "-map".to_string(),
        format!("{source}:s?"),
        "-map".to_string(),
        format!("{source}:t?"),
        "-map_chapters".to_string(),
        source.to_string(),
        "-map_metadata".to_string(),
        source.to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// Muxes `inputs` into `output` and validates the result against `source_info`.
pub fn mux_tracks<S: FfmpegSpawner, P: MediaProber>(
    spawner: &S,
    prober: &P,
    inputs: &MuxInputs<'_>,
    output: &Path,
    source_info: &MediaInfo,
) -> CoreResult<MediaInfo> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    info!(
        "Muxing video with {} audio track(s) into {}",
        inputs.audio_tracks.len(),
        output.display()
    );
    let mut cmd = FfmpegCommand::new();
    cmd.args(mux_args(inputs, output));
    run_ffmpeg(spawner, cmd, "mux").map_err(|e| CoreError::Mux(e.to_string()))?;

    let output_info = prober
        .probe(output)
        .map_err(|e| CoreError::Validation(format!("output cannot be probed: {e}")))?;
    validate_output(source_info, &output_info)?;
    debug!("Output validated: {:.2}s", output_info.duration_secs);
    Ok(output_info)
}

/// Checks the muxed output against the source it was made from.
pub fn validate_output(source: &MediaInfo, output: &MediaInfo) -> CoreResult<()> {
    let drift = (output.duration_secs - source.duration_secs).abs();
    if drift > DURATION_TOLERANCE_SECS {
        return Err(CoreError::Validation(format!(
            "duration {:.2}s differs from source {:.2}s by {drift:.2}s",
            output.duration_secs, source.duration_secs
        )));
    }

    if !output.video.codec_name.eq_ignore_ascii_case(EXPECTED_VIDEO_CODEC) {
        return Err(CoreError::Validation(format!(
            "video codec is {}, expected {EXPECTED_VIDEO_CODEC}",
            output.video.codec_name
        )));
    }

    if let Some(stream) = output
        .audio_streams
        .iter()
        .find(|a| !a.codec_name.eq_ignore_ascii_case(EXPECTED_AUDIO_CODEC))
    {
        return Err(CoreError::Validation(format!(
            "audio stream {} is {}, expected {EXPECTED_AUDIO_CODEC}",
            stream.index, stream.codec_name
        )));
    }

    if output.audio_streams.len() != source.audio_streams.len() {
        return Err(CoreError::Validation(format!(
            "{} audio stream(s), source has {}",
            output.audio_streams.len(),
            source.audio_streams.len()
        )));
    }

    if output.subtitle_count != source.subtitle_count {
        return Err(CoreError::Validation(format!(
            "{} subtitle stream(s), source has {}",
            output.subtitle_count, source.subtitle_count
        )));
    }

    if output.attachment_count != source.attachment_count {
        return Err(CoreError::Validation(format!(
            "{} attachment(s), source has {}",
            output.attachment_count, source.attachment_count
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::AudioStreamInfo;
    use crate::processing::VideoProperties;

    fn info(duration: f64, video: &str, audio: &[&str], subtitles: usize) -> MediaInfo {
        MediaInfo {
            duration_secs: duration,
            format_name: "matroska,webm".to_string(),
            size_bytes: None,
            video: VideoProperties {
                width: 1920,
                height: 1080,
                codec_name: video.to_string(),
                ..Default::default()
            },
            audio_streams: audio
                .iter()
                .enumerate()
                .map(|(i, c)| AudioStreamInfo {
                    index: i + 1,
                    codec_name: c.to_string(),
                    channels: 2,
                })
                .collect(),
            subtitle_count: subtitles,
            attachment_count: 0,
            chapter_count: 0,
        }
    }

    #[test]
    fn test_mux_args_input_order() {
        let tracks = vec![PathBuf::from("a0.mkv"), PathBuf::from("a1.mkv")];
        let inputs = MuxInputs {
            video: Path::new("video.mkv"),
            audio_tracks: &tracks,
            source: Path::new("source.mkv"),
        };
        let args = mux_args(&inputs, Path::new("out.mkv"));
        let maps: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-map")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(maps, ["0:v:0", "1:a:0", "2:a:0", "3:s?", "3:t?"]);
        assert!(args.windows(2).any(|w| w[0] == "-map_chapters" && w[1] == "3"));
        assert_eq!(args.last().map(String::as_str), Some("out.mkv"));
    }

    #[test]
    fn test_validate_output() {
        let source = info(600.0, "h264", &["ac3", "dts"], 2);
        assert!(validate_output(&source, &info(600.4, "av1", &["opus", "opus"], 2)).is_ok());
        assert!(validate_output(&source, &info(598.0, "av1", &["opus", "opus"], 2)).is_err());
        assert!(validate_output(&source, &info(600.0, "hevc", &["opus", "opus"], 2)).is_err());
        assert!(validate_output(&source, &info(600.0, "av1", &["opus", "aac"], 2)).is_err());
        assert!(validate_output(&source, &info(600.0, "av1", &["opus"], 2)).is_err());
        assert!(validate_output(&source, &info(600.0, "av1", &["opus", "opus"], 1)).is_err());
    }

    #[test]
    fn test_validate_output_counts_attachments() {
        let mut source = info(600.0, "h264", &["ac3"], 1);
        source.attachment_count = 3;
        let mut output = info(600.0, "av1", &["opus"], 1);
        output.attachment_count = 3;
        assert!(validate_output(&source, &output).is_ok());

        output.attachment_count = 0;
        match validate_output(&source, &output) {
            Err(CoreError::Validation(msg)) => assert!(msg.contains("attachment")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
