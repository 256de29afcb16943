// ============================================================================
// splicer-core/src/encoding/segmentation.rs
// ============================================================================
//
// SEGMENTATION: Lossless Split of the Source Video
//
// The source video stream is stream-copied into fixed-length pieces with the
// ffmpeg segment muxer. Output files are zero-padded and sequentially
// numbered, and that numbering is the segment order for the rest of the job.
// Every piece is validated before it is handed to the scheduler; a single
// bad piece fails segmentation as a whole.

use std::fs;
use std::path::{Path, PathBuf};

use ffmpeg_sidecar::command::FfmpegCommand;
use log::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegSpawner, MediaProber, run_ffmpeg};
use crate::state::Segment;
use crate::workspace::JobWorkspace;

/// Smallest file the segment muxer can produce for a real piece of video.
pub const MIN_SEGMENT_BYTES: u64 = 1024;

/// Number of segments a source of `duration_secs` splits into.
pub fn expected_segment_count(duration_secs: f64, segment_length_secs: f64) -> usize {
    if duration_secs <= 0.0 || segment_length_secs <= 0.0 {
        return 0;
    }
    (duration_secs / segment_length_secs).ceil() as usize
}

/// ffmpeg arguments splitting the first video stream of `input`.
pub fn segment_args(input: &Path, output_pattern: &Path, segment_length_secs: f64) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-an".to_string(),
        "-sn".to_string(),
        "-dn".to_string(),
        "-f".to_string(),
        "segment".to_string(),
        "-segment_time".to_string(),
        format!("{segment_length_secs}"),
        "-reset_timestamps".to_string(),
        "1".to_string(),
        "-y".to_string(),
        output_pattern.to_string_lossy().into_owned(),
    ]
}

/// Splits `input` into the workspace's `segments/` directory and returns
/// the validated segments in index order.
pub fn segment_video<S: FfmpegSpawner, P: MediaProber>(
    spawner: &S,
    prober: &P,
    input: &Path,
    workspace: &JobWorkspace,
    segment_length_secs: f64,
    total_duration_secs: f64,
) -> CoreResult<Vec<Segment>> {
    let segments_dir = workspace.segments_dir();
    fs::create_dir_all(&segments_dir)?;

    info!(
        "Segmenting into {segment_length_secs}s pieces (expecting {})",
        expected_segment_count(total_duration_secs, segment_length_secs)
    );

    let mut cmd = FfmpegCommand::new();
    cmd.args(segment_args(input, &workspace.segment_pattern(), segment_length_secs));
    run_ffmpeg(spawner, cmd, "segmentation")
        .map_err(|e| CoreError::Segmentation(e.to_string()))?;

    collect_segments(prober, &segments_dir, segment_length_secs, total_duration_secs)
}

/// Validates the segment files already present in `segments_dir`.
///
/// Also used on resume, where segmentation is skipped if the pieces from the
/// previous run are still on disk.
pub fn collect_segments<P: MediaProber>(
    prober: &P,
    segments_dir: &Path,
    segment_length_secs: f64,
    total_duration_secs: f64,
) -> CoreResult<Vec<Segment>> {
    let files = list_segment_files(segments_dir)?;
    if files.is_empty() {
        return Err(CoreError::Segmentation(format!(
            "no segments were produced in {}",
            segments_dir.display()
        )));
    }

    let mut segments = Vec::with_capacity(files.len());
    let mut start_time = 0.0;
    for (index, path) in files.into_iter().enumerate() {
        let (size_bytes, duration) = validate_segment(prober, &path)?;
        debug!("Segment {index}: {:.2}s, {size_bytes} bytes", duration);
        segments.push(Segment::new(index, path, size_bytes, start_time, duration));
        start_time += duration;
    }

    let expected = expected_segment_count(total_duration_secs, segment_length_secs);
    if segments.len() != expected {
        warn!(
            "Produced {} segments, expected {expected} (keyframe placement moves split points)",
            segments.len()
        );
    }

    let summed = start_time;
    if (summed - total_duration_secs).abs() > segment_length_secs {
        return Err(CoreError::Segmentation(format!(
            "segment durations sum to {summed:.2}s but the source is {total_duration_secs:.2}s"
        )));
    }

    info!("Validated {} segments", segments.len());
    Ok(segments)
}

/// Segment files in index order.
///
/// Ordering is by the number in the file stem, since `%04d` names stop
/// sorting as text once an index needs five digits. The numbers must run
/// from zero without gaps.
fn list_segment_files(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut numbered = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || !path.extension().is_some_and(|ext| ext == "mkv") {
            continue;
        }
        let number = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<usize>().ok())
            .ok_or_else(|| {
                CoreError::Segmentation(format!(
                    "unexpected file {} in segment directory",
                    path.display()
                ))
            })?;
        numbered.push((number, path));
    }
    numbered.sort_by_key(|(number, _)| *number);

    if let Some((position, (number, _))) = numbered
        .iter()
        .enumerate()
        .find(|(position, (number, _))| position != number)
    {
        return Err(CoreError::Segmentation(format!(
            "segment numbering has a gap: expected {position}, found {number}"
        )));
    }
    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}

/// Checks size and decodability; returns `(size, duration)`.
fn validate_segment<P: MediaProber>(prober: &P, path: &Path) -> CoreResult<(u64, f64)> {
    let invalid = |reason: String| CoreError::SegmentValidation {
        path: path.to_path_buf(),
        reason,
    };

    let size = fs::metadata(path)?.len();
    if size < MIN_SEGMENT_BYTES {
        return Err(invalid(format!("only {size} bytes")));
    }

    let info = prober
        .probe(path)
        .map_err(|e| invalid(format!("probe failed: {e}")))?;
    if info.duration_secs <= 0.0 {
        return Err(invalid(format!("duration {:.2}s", info.duration_secs)));
    }
    Ok((size, info.duration_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_segment_count() {
        assert_eq!(expected_segment_count(600.0, 15.0), 40);
        assert_eq!(expected_segment_count(601.0, 15.0), 41);
        assert_eq!(expected_segment_count(5.0, 15.0), 1);
        assert_eq!(expected_segment_count(0.0, 15.0), 0);
    }

    #[test]
    fn test_segment_args() {
        let args = segment_args(Path::new("in.mkv"), Path::new("segments/%04d.mkv"), 15.0);
        assert!(args.windows(2).any(|w| w[0] == "-segment_time" && w[1] == "15"));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-reset_timestamps" && w[1] == "1"));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("segments/%04d.mkv"));
    }

    fn file_names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_list_segment_files_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0002.mkv", "0000.mkv", "0001.mkv", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let files = list_segment_files(dir.path()).unwrap();
        assert_eq!(file_names(&files), ["0000.mkv", "0001.mkv", "0002.mkv"]);
    }

    #[test]
    fn test_list_segment_files_orders_past_four_digits() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10002 {
            fs::write(dir.path().join(format!("{i:04}.mkv")), b"").unwrap();
        }
        let files = list_segment_files(dir.path()).unwrap();
        assert_eq!(files.len(), 10002);
        assert_eq!(
            file_names(&files[9998..]),
            ["9998.mkv", "9999.mkv", "10000.mkv", "10001.mkv"]
        );
    }

    #[test]
    fn test_list_segment_files_rejects_gaps_and_stray_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0000.mkv", "0002.mkv"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert!(matches!(
            list_segment_files(dir.path()),
            Err(CoreError::Segmentation(msg)) if msg.contains("gap")
        ));

        let dir = tempfile::tempdir().unwrap();
        for name in ["0000.mkv", "0000.attempt.mkv"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert!(matches!(
            list_segment_files(dir.path()),
            Err(CoreError::Segmentation(_))
        ));
    }
}
