//! Audio transcoding to Opus.
//!
//! Every source audio track is transcoded once, independently of the video
//! encode path, into its own file under the job's `audio/` directory. The
//! muxer then maps those files next to the encoded video.

use crate::error::CoreResult;
use crate::external::{AudioStreamInfo, FfmpegSpawner, run_ffmpeg};
use ffmpeg_sidecar::command::FfmpegCommand;
use std::fs;
use std::path::{Path, PathBuf};

/// Returns audio bitrate in kbps based on channel count (mono:64, stereo:128, 5.1:256, 7.1:384).
pub fn calculate_audio_bitrate(channels: u32) -> u32 {
    match channels {
        1 => 64,            // Mono
        2 => 128,           // Stereo
        6 => 256,           // 5.1 surround
        8 => 384,           // 7.1 surround
        _ => channels * 48, // ~48 kbps per channel for non-standard configs
    }
}

/// Channel layout libopus should be fed for a given channel count.
fn channel_layout(channels: u32) -> Option<&'static str> {
    match channels {
        6 => Some("5.1"),
        8 => Some("7.1"),
        _ => None,
    }
}

/// Output path for the `n`th audio track.
pub fn audio_track_path(audio_dir: &Path, track: usize) -> PathBuf {
    audio_dir.join(format!("track_{track}.mkv"))
}

/// ffmpeg arguments transcoding audio track `track` (relative audio index).
pub fn audio_args(input: &Path, track: usize, channels: u32, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-map".to_string(),
        format!("0:a:{track}"),
        "-vn".to_string(),
        "-sn".to_string(),
        "-dn".to_string(),
        "-c:a".to_string(),
        "libopus".to_string(),
    ];
    if let Some(layout) = channel_layout(channels) {
        args.push("-af".to_string());
        args.push(format!("aformat=channel_layouts={layout}"));
    }
    args.extend([
        "-vbr".to_string(),
        "on".to_string(),
        "-compression_level".to_string(),
        "10".to_string(),
        "-frame_duration".to_string(),
        "20".to_string(),
        "-b:a".to_string(),
        format!("{}k", calculate_audio_bitrate(channels)),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// Transcodes every audio track of `input` and returns the output paths in
/// track order.
pub fn encode_audio_tracks<S: FfmpegSpawner>(
    spawner: &S,
    input: &Path,
    tracks: &[AudioStreamInfo],
    audio_dir: &Path,
) -> CoreResult<Vec<PathBuf>> {
    if tracks.is_empty() {
        log::info!("Audio streams: None detected");
        return Ok(Vec::new());
    }
    fs::create_dir_all(audio_dir)?;

    let mut outputs = Vec::with_capacity(tracks.len());
    for (track, info) in tracks.iter().enumerate() {
        let output = audio_track_path(audio_dir, track);
        log::info!(
            "Encoding audio track {track} ({}, {}ch) at {}kbps",
            info.codec_name,
            info.channels,
            calculate_audio_bitrate(info.channels)
        );

        let mut cmd = FfmpegCommand::new();
        cmd.args(audio_args(input, track, info.channels, &output));
        run_ffmpeg(spawner, cmd, &format!("audio track {track}"))?;
        outputs.push(output);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrates() {
        assert_eq!(calculate_audio_bitrate(1), 64);
        assert_eq!(calculate_audio_bitrate(2), 128);
        assert_eq!(calculate_audio_bitrate(6), 256);
        assert_eq!(calculate_audio_bitrate(8), 384);
        assert_eq!(calculate_audio_bitrate(4), 192);
    }

    #[test]
    fn test_audio_args_for_surround() {
        let args = audio_args(Path::new("in.mkv"), 1, 6, Path::new("audio/track_1.mkv"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a:1"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "libopus"));
        assert!(args.windows(2).any(|w| w[0] == "-b:a" && w[1] == "256k"));
        assert!(args.contains(&"aformat=channel_layouts=5.1".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("audio/track_1.mkv"));
    }

    #[test]
    fn test_stereo_has_no_layout_filter() {
        let args = audio_args(Path::new("in.mkv"), 0, 2, Path::new("out.mkv"));
        assert!(!args.iter().any(|a| a == "-af"));
        assert!(args.contains(&"128k".to_string()));
    }
}
