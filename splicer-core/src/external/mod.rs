// ============================================================================
// splicer-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with External CLI Tools
//
// This module encapsulates interactions with ffmpeg and ffprobe. Each tool
// sits behind a trait so the orchestrator can be driven by scripted test
// doubles, and the concrete implementations shell out to the real binaries.
//
// KEY COMPONENTS:
// - FfmpegSpawner / FfmpegProcess: ffmpeg via ffmpeg-sidecar
// - MediaProber: stream metadata via ffprobe JSON
// - FrameSampler: per-frame filter tags via ffprobe + lavfi
// - command: blocking and cancellable process runners
// - check_dependency: verifies a tool is installed

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};

// ---- Standard library imports ----
use std::io;
use std::process::{Command, Stdio};

// ============================================================================
// SUBMODULES
// ============================================================================

pub mod command;
pub mod ffmpeg_executor;
pub mod ffprobe_executor;
pub mod frame_sampler;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use command::{CancellationToken, ProcessControl, run_command, run_controlled};
pub use ffmpeg_executor::{FfmpegProcess, FfmpegSpawner, SidecarProcess, SidecarSpawner, run_ffmpeg};
pub use ffprobe_executor::{AudioStreamInfo, FfprobeCli, MediaInfo, MediaProber};
pub use frame_sampler::{FfprobeFrameSampler, FrameSampler, FrameTags};

// ============================================================================
// DEPENDENCY CHECKING
// ============================================================================

/// Tools a full job shells out to.
pub const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe", "ab-av1"];

/// Checks if a required external command is available and executable.
///
/// Runs the command with `--version` (or `-version` for the ffmpeg family)
/// and only cares whether it could be started.
pub fn check_dependency(cmd_name: &str) -> CoreResult<()> {
    let version_arg = if cmd_name.starts_with("ff") { "-version" } else { "--version" };

    let result = Command::new(cmd_name)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {}", cmd_name);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{}' not found.", cmd_name);
            Err(CoreError::MissingDependency(cmd_name.to_string()))
        }
        Err(e) => {
            log::error!("Failed to start dependency check command '{}': {}", cmd_name, e);
            Err(CoreError::CommandStart(cmd_name.to_string(), e))
        }
    }
}

/// Checks every tool in [`REQUIRED_TOOLS`].
pub fn check_required_tools() -> CoreResult<()> {
    REQUIRED_TOOLS.iter().try_for_each(|tool| check_dependency(tool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dependency() {
        assert!(matches!(
            check_dependency("splicer-no-such-tool"),
            Err(CoreError::MissingDependency(name)) if name == "splicer-no-such-tool"
        ));
    }
}
