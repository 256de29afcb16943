// splicer-cli/src/cli.rs
//
// Defines the command-line argument structures using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "Splicer: chunked AV1 transcoding orchestrator",
    long_about = "Splits a video into segments, encodes them in parallel to AV1 at a VMAF target \
                  with ab-av1, transcodes audio to Opus and muxes everything back together."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcodes one input file into an AV1/Opus Matroska output
    Encode(EncodeArgs),
    /// Shows the progress of an in-flight or interrupted job
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
pub struct EncodeArgs {
    /// Source video file
    #[arg(short = 'i', long = "input", required = true, value_name = "INPUT_FILE")]
    pub input_path: PathBuf,

    /// Output file (.mkv)
    #[arg(short = 'o', long = "output", required = true, value_name = "OUTPUT_FILE")]
    pub output_path: PathBuf,

    /// Root directory for per-job working directories
    #[arg(long, value_name = "DIR", env = "SPLICER_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Optional: Directory for log files. Logs go to stderr only when unset.
    #[arg(short, long, value_name = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    // --- Quality ---
    /// Minimum VMAF the encoder's quality search must reach
    #[arg(long, value_name = "VMAF")]
    pub target_vmaf: Option<f32>,

    /// Optional: Override the libsvtav1 encoder preset (0-13, lower is slower/better quality)
    #[arg(long, value_name = "PRESET_INT", value_parser = clap::value_parser!(u8).range(0..=13))]
    pub preset: Option<u8>,

    // --- Segmentation and sampling ---
    /// Segment length in seconds
    #[arg(long, value_name = "SECONDS")]
    pub segment_length: Option<f64>,

    /// Quality-search samples per segment on the first attempt
    #[arg(long = "samples", value_name = "COUNT")]
    pub sample_count: Option<u32>,

    /// Length in seconds of each quality-search sample on the first attempt
    #[arg(long, value_name = "SECONDS")]
    pub sample_duration: Option<u32>,

    /// Disable automatic crop detection
    #[arg(long)]
    pub disable_crop: bool,

    // --- Scheduling ---
    /// Number of segments encoded at once (defaults to the CPU count)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Per-attempt encode timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub encode_timeout: Option<u64>,

    /// Keep the job's working directory after a successful encode
    #[arg(long, default_value_t = false)]
    pub keep_workspace: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Source video file of the job
    #[arg(short = 'i', long = "input", required = true, value_name = "INPUT_FILE")]
    pub input_path: PathBuf,

    /// Root directory for per-job working directories
    #[arg(long, value_name = "DIR", env = "SPLICER_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}
