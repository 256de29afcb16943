//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

/// Transcodes one file through the core pipeline.
pub mod encode;
/// Reads the persisted progress of a job.
pub mod status;
