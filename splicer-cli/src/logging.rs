// ============================================================================
// splicer-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: Console and File Logging for the CLI
//
// With a log directory, all output goes through splicer-core's log4rs setup
// to a timestamped file and to stderr. Without one, env_logger writes to
// stderr and honors RUST_LOG:
// - RUST_LOG=info (default): Normal operation logs
// - RUST_LOG=debug: Detailed debugging information

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;
use splicer_core::file_logging::{log_file_name, setup_file_logging};

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub fn log_level(verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Debug } else { LevelFilter::Info }
}

/// Initializes logging once per process. Returns the log file path when
/// file logging is active.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> Result<Option<PathBuf>> {
    let level = log_level(verbose);
    match log_dir {
        Some(dir) => {
            let log_file = dir.join(log_file_name(&get_timestamp()));
            setup_file_logging(&log_file, level)
                .with_context(|| format!("Failed to set up logging to {}", log_file.display()))?;
            Ok(Some(log_file))
        }
        None => {
            let default_filter = if verbose { "debug" } else { "info" };
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
                .format_timestamp(None)
                .format_target(false)
                .init();
            Ok(None)
        }
    }
}
