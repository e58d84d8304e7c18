//! CLI argument parsing for pushlock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Pushlock: coordinated git commit and push for concurrent CI pipelines.
///
/// Pipelines sharing one checkout take a file-based lock before committing,
/// and recover from rejected pushes by rebasing onto the remote branch.
/// Results are printed as JSON on stdout; diagnostics go to stderr.
#[derive(Parser, Debug)]
#[command(name = "pushlock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log coordination and git activity at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Run as if started in this directory.
    #[arg(short = 'C', long = "repo", global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Configuration file (default: .pushlock.yaml at the repository root).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for pushlock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Commit and push while holding the git-commit-push lock.
    ///
    /// Waits for other holders, reclaims abandoned locks, and retries a
    /// rejected push after rebasing onto the remote branch.
    CommitPush(CommitArgs),

    /// Commit and push without waiting for the lock.
    ///
    /// Clears every lock marker and any half-finished rebase or merge first.
    /// Use only when coordination itself is stuck.
    EmergencyCommitPush(CommitArgs),

    /// Print working-tree state and active locks as JSON.
    Status,

    /// Print whether the working tree has changes; exits 1 when it has none.
    HasChanges,
}

/// Arguments shared by the commit commands.
#[derive(Parser, Debug)]
pub struct CommitArgs {
    /// Commit message.
    pub message: String,

    /// Author email (default from configuration).
    pub email: Option<String>,

    /// Author name (default from configuration).
    pub name: Option<String>,

    /// Paths to stage, as separate arguments or comma-separated (default: ".").
    #[arg(value_delimiter = ',')]
    pub files: Vec<String>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
