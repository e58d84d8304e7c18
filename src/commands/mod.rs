//! Command implementations for pushlock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Each command resolves the repository context, wires up
//! the coordinated git operations, and prints its result as JSON.

use crate::cli::{Cli, Command, CommitArgs};
use crate::context::RepoContext;
use crate::coordinated::CoordinatedGitOperations;
use crate::error::{PushlockError, Result};
use crate::safe_git::GitOperationRequest;
use serde::Serialize;
use tracing::debug;

const LOG_TARGET: &str = "cli";

/// Dispatch a command to its implementation.
///
/// Returns whether the command succeeded in the exit-status sense;
/// `has-changes` reports a clean tree as `Ok(false)`.
pub fn dispatch(cli: Cli) -> Result<bool> {
    let ctx = RepoContext::resolve(cli.repo.as_deref(), cli.config.as_deref())?;
    debug!(target: LOG_TARGET, "repository root: {}", ctx.repo_root.display());

    let ops = CoordinatedGitOperations::from_context(&ctx);

    match cli.command {
        Command::CommitPush(args) => cmd_commit_push(&ctx, &ops, args),
        Command::EmergencyCommitPush(args) => cmd_emergency_commit_push(&ctx, &ops, args),
        Command::Status => cmd_status(&ops),
        Command::HasChanges => cmd_has_changes(&ops),
    }
}

fn cmd_commit_push(ctx: &RepoContext, ops: &CoordinatedGitOperations, args: CommitArgs) -> Result<bool> {
    let request = build_request(ctx, args);
    let result = ops.coordinated_commit_push(&request)?;
    print_json(&result)?;
    Ok(result.success)
}

fn cmd_emergency_commit_push(
    ctx: &RepoContext,
    ops: &CoordinatedGitOperations,
    args: CommitArgs,
) -> Result<bool> {
    let request = build_request(ctx, args);
    let result = ops.emergency_commit_push(&request)?;
    print_json(&result)?;
    Ok(result.success)
}

fn cmd_status(ops: &CoordinatedGitOperations) -> Result<bool> {
    let status = ops.get_status()?;
    print_json(&status)?;
    Ok(true)
}

fn cmd_has_changes(ops: &CoordinatedGitOperations) -> Result<bool> {
    let has_changes = ops.git().has_changes()?;
    println!("{}", has_changes);
    Ok(has_changes)
}

/// Merge command-line arguments over the configured defaults.
/// An empty email or name argument means "use the default".
fn build_request(ctx: &RepoContext, args: CommitArgs) -> GitOperationRequest {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    let files = args
        .files
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();

    GitOperationRequest::new(args.message, &ctx.config)
        .with_identity(non_empty(args.email), non_empty(args.name))
        .with_files(files)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PushlockError::UserError(format!("failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
