//! Implementation of the 'status' subcommand.
//!
//! Reads the progress document the state actor keeps in the job workspace.
//! It works while another process is encoding, since the document is only
//! ever replaced atomically.

use crate::cli::StatusArgs;

use anyhow::{Result, bail};
use splicer_core::config::DEFAULT_WORK_DIR;
use splicer_core::{JobWorkspace, ProgressSummary, StateStore};
use std::path::PathBuf;

/// Loads the progress summary for the job working on `args.input_path`.
pub fn load_status(args: &StatusArgs) -> Result<ProgressSummary> {
    let work_dir = args
        .work_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));
    let workspace = JobWorkspace::for_input(&work_dir, &args.input_path);
    if !workspace.exists() {
        bail!(
            "No job workspace for '{}' under {}",
            args.input_path.display(),
            work_dir.display()
        );
    }

    let store = StateStore::open(&workspace.data_dir())?;
    match store.load_progress()? {
        Some(summary) => Ok(summary),
        None => bail!("No progress recorded yet in {}", workspace.root().display()),
    }
}

pub fn format_status(summary: &ProgressSummary) -> String {
    format!(
        "Job {} [{}]: {:.1}% ({}/{} segments done, {} encoding, {} pending, {} failed), updated {}",
        summary.job_id,
        summary.job_status.as_str(),
        summary.percent_complete,
        summary.completed,
        summary.total,
        summary.encoding,
        summary.pending,
        summary.failed,
        summary.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Main entry point for the status command.
pub fn run_status(args: StatusArgs) -> Result<()> {
    let summary = load_status(&args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_status(&summary));
    }
    Ok(())
}
