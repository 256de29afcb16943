// splicer-cli/src/main.rs
//
// Entry point for the Splicer command-line tool.
//
// Parses arguments, sets up logging, dispatches to the selected command and
// maps failures to a non-zero exit code.

use clap::Parser;
use log::error;
use splicer_cli::logging::init_logging;
use splicer_cli::{Cli, Commands, run_encode, run_status};
use std::process;

fn main() {
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Encode(args) => args.log_dir.clone(),
        Commands::Status(_) => None,
    };
    match init_logging(log_dir.as_deref(), cli.verbose) {
        Ok(Some(log_file)) => log::info!("Logging to {}", log_file.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Encode(args) => run_encode(args).map(|_| ()),
        Commands::Status(args) => run_status(args),
    };

    if let Err(e) = result {
        error!("Error: {e:#}");
        process::exit(1);
    }
}
