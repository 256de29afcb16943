//! File and console logging through log4rs.
//!
//! The CLI calls [`setup_file_logging`] once at startup; everything else in
//! the crate logs through the `log` macros.

pub mod setup;

pub use setup::{log_file_name, setup_file_logging};
