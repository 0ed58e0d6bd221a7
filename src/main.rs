//! Interlock: train and intersection simulation with deadlock detection and
//! recovery.
//!
//! This is the main entry point for the `interlock` CLI. It parses arguments,
//! dispatches to the appropriate command handler, and handles errors with
//! proper exit codes.

mod cli;
mod commands;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod ledger;
pub mod parser;
pub mod protocol;
pub mod recovery;
pub mod simulation;
pub mod table;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
