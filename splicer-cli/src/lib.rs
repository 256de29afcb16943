// splicer-cli/src/lib.rs
//
// Library portion of the Splicer CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod logging;

// Re-export items needed by the binary or integration tests
pub use cli::{Cli, Commands, EncodeArgs, StatusArgs};
pub use commands::encode::run_encode;
pub use commands::status::run_status;
