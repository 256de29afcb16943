//! Segment merger.
//!
//! Joins encoded segments with ffmpeg's concat demuxer. The join order comes
//! from segment indices only; completion order during the encode pass has
//! no influence on the output.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ffmpeg_sidecar::command::FfmpegCommand;
use log::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegSpawner, MediaProber, run_ffmpeg};
use crate::state::Segment;
use crate::workspace::JobWorkspace;

/// Allowed drift between the joined video and the summed segment durations.
pub const DURATION_TOLERANCE_SECS: f64 = 1.0;

/// Encoded segment paths in index order.
///
/// Fails with `IncompleteSegments` naming the lowest index that is not
/// completed, and with `Concatenation` if the indices are not `0..N-1`.
pub fn ordered_encoded_paths(segments: &[Segment], workspace: &JobWorkspace) -> CoreResult<Vec<PathBuf>> {
    if segments.is_empty() {
        return Err(CoreError::Concatenation("no segments to join".to_string()));
    }

    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index);

    if let Some(pending) = ordered.iter().find(|s| !s.is_completed()) {
        return Err(CoreError::IncompleteSegments(pending.index));
    }
    for (expected, segment) in ordered.iter().enumerate() {
        if segment.index != expected {
            return Err(CoreError::Concatenation(format!(
                "segment indices are not contiguous: expected {expected}, found {}",
                segment.index
            )));
        }
    }

    Ok(ordered
        .into_iter()
        .map(|s| workspace.encoded_path(s.index))
        .collect())
}

/// Writes a concat demuxer list file.
pub fn write_concat_list(list_path: &Path, paths: &[PathBuf]) -> CoreResult<()> {
    let mut file = fs::File::create(list_path)?;
    for path in paths {
        // Single quotes inside a quoted entry are written as '\''
        let escaped = path.to_string_lossy().replace('\'', "'\\''");
        writeln!(file, "file '{escaped}'")?;
    }
    file.sync_all()?;
    Ok(())
}

/// ffmpeg arguments for a stream-copy join of `list_path`.
pub fn concat_args(list_path: &Path, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_path.to_string_lossy().into_owned(),
        "-c".to_string(),
        "copy".to_string(),
        "-fflags".to_string(),
        "+genpts".to_string(),
        "-map_metadata".to_string(),
        "0".to_string(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Joins all completed segments into the workspace's video output and
/// checks its duration.
pub fn concatenate_segments<S: FfmpegSpawner, P: MediaProber>(
    spawner: &S,
    prober: &P,
    segments: &[Segment],
    workspace: &JobWorkspace,
) -> CoreResult<PathBuf> {
    let paths = ordered_encoded_paths(segments, workspace)?;
    if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
        return Err(CoreError::Concatenation(format!(
            "encoded segment {} is missing",
            missing.display()
        )));
    }

    let list = workspace.concat_list();
    write_concat_list(&list, &paths)?;
    debug!("Wrote concat list with {} entries to {}", paths.len(), list.display());

    let output = workspace.video_output();
    let mut cmd = FfmpegCommand::new();
    cmd.args(concat_args(&list, &output));
    run_ffmpeg(spawner, cmd, "concat").map_err(|e| CoreError::Concatenation(e.to_string()))?;

    let expected: f64 = segments.iter().map(|s| s.duration).sum();
    let joined = prober
        .probe(&output)
        .map_err(|e| CoreError::Concatenation(format!("joined video cannot be probed: {e}")))?;
    if (joined.duration_secs - expected).abs() > DURATION_TOLERANCE_SECS {
        return Err(CoreError::Concatenation(format!(
            "joined video is {:.2}s, segments sum to {expected:.2}s",
            joined.duration_secs
        )));
    }

    info!("Joined {} segments ({:.2}s)", paths.len(), joined.duration_secs);
    Ok(output)
}
