//! Pushlock: coordinated git commit and push for concurrent CI pipelines.
//!
//! This is the main entry point for the `pushlock` CLI. It parses arguments,
//! sets up logging, dispatches to the appropriate command handler, and maps
//! errors to a JSON payload on stdout and a non-zero exit code.

mod cli;
mod commands;
pub mod config;
pub mod context;
pub mod coordinated;
pub mod coordinator;
pub mod error;
pub mod exit_codes;
pub mod git;
pub mod locks;
pub mod logging;
pub mod safe_git;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init(cli.verbose);

    match commands::dispatch(cli) {
        Ok(true) => ExitCode::from(exit_codes::SUCCESS as u8),
        Ok(false) => ExitCode::from(exit_codes::FAILURE as u8),
        Err(err) => {
            // Machine-readable result on stdout, human-readable line on stderr
            println!("{}", err.to_json());
            eprintln!("Error: {}", err);

            ExitCode::from(err.exit_code() as u8)
        }
    }
}
