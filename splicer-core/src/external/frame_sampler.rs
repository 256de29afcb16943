// ============================================================================
// splicer-core/src/external/frame_sampler.rs
// ============================================================================
//
// FRAME SAMPLER: Structured Per-Frame Filter Metadata
//
// Crop analysis needs per-frame measurements from ffmpeg filters
// (signalstats for black level, cropdetect for crop candidates). Rather than
// scraping ffmpeg's log text, the sampler runs ffprobe over a lavfi `movie`
// source and asks for `frame_tags` as JSON, so every measurement arrives as
// a key/value pair such as `lavfi.cropdetect.h = 800`.

use crate::error::{CoreError, CoreResult};
use crate::external::command::run_command;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Filter metadata attached to a single frame.
pub type FrameTags = HashMap<String, String>;

/// Runs a filter chain over a file and returns the tags of every frame
/// that reached the end of the chain.
pub trait FrameSampler {
    fn sample_frames(
        &self,
        input: &Path,
        filter_chain: &str,
        max_frames: Option<u32>,
    ) -> CoreResult<Vec<FrameTags>>;
}

/// `FrameSampler` backed by ffprobe's lavfi device.
#[derive(Debug, Clone)]
pub struct FfprobeFrameSampler {
    binary: PathBuf,
}

impl Default for FfprobeFrameSampler {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeFrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the ffprobe invocation. Public for inspection in tests.
    pub fn build_command(&self, input: &Path, filter_chain: &str, max_frames: Option<u32>) -> Command {
        let graph = format!(
            "movie={}{}{}",
            escape_filter_value(&input.to_string_lossy()),
            if filter_chain.is_empty() { "" } else { "," },
            filter_chain
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-v", "error", "-f", "lavfi", "-i"])
            .arg(graph)
            .args(["-show_entries", "frame_tags", "-of", "json"]);
        if let Some(frames) = max_frames {
            cmd.arg("-read_intervals").arg(format!("%+#{frames}"));
        }
        cmd
    }
}

#[derive(Debug, Deserialize)]
struct FramesOutput {
    #[serde(default)]
    frames: Vec<FrameEntry>,
}

#[derive(Debug, Deserialize)]
struct FrameEntry {
    #[serde(default)]
    tags: FrameTags,
}

/// Parses `-show_entries frame_tags -of json` output.
pub fn parse_frame_tags(json: &str) -> CoreResult<Vec<FrameTags>> {
    let output: FramesOutput = serde_json::from_str(json)
        .map_err(|e| CoreError::FfprobeParse(format!("frame tags: {e}")))?;
    Ok(output.frames.into_iter().map(|f| f.tags).collect())
}

impl FrameSampler for FfprobeFrameSampler {
    fn sample_frames(
        &self,
        input: &Path,
        filter_chain: &str,
        max_frames: Option<u32>,
    ) -> CoreResult<Vec<FrameTags>> {
        let mut cmd = self.build_command(input, filter_chain, max_frames);
        let output = run_command(&mut cmd)?;
        parse_frame_tags(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Escapes a value for use as a filter option inside a filter graph.
///
/// Applies both escaping levels: option values (`\`, `'`, `:`) and then
/// the graph itself (`\`, `'`, `[`, `]`, `,`, `;`).
pub fn escape_filter_value(value: &str) -> String {
    let escape = |input: &str, special: &[char]| {
        let mut out = String::with_capacity(input.len());
        for c in input.chars() {
            if special.contains(&c) {
                out.push('\\');
            }
            out.push(c);
        }
        out
    };
    let option_level = escape(value, &['\\', '\'', ':']);
    escape(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}
