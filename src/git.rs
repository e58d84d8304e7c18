//! Git command runner for pushlock.
//!
//! Provides a safe wrapper around git commands with captured stdout/stderr
//! and structured error handling. All git operations should go through this module.

use crate::error::{PushlockError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Captured output of a git command.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output from the command (trimmed).
    pub stdout: String,
    /// Standard error from the command (trimmed).
    pub stderr: String,
}

impl GitOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Returns true if stdout is empty.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty()
    }

    /// Returns stdout lines as a vector.
    pub fn lines(&self) -> Vec<&str> {
        if self.stdout.is_empty() {
            Vec::new()
        } else {
            self.stdout.lines().collect()
        }
    }

    /// The most useful diagnostic text: stderr, or stdout when stderr is empty.
    pub fn message(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// A finished git command, successful or not.
#[derive(Debug, Clone)]
pub struct GitRun {
    /// Whether git exited with status 0.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
    /// Captured output.
    pub output: GitOutput,
}

/// Run a git command and return its outcome without treating a non-zero exit
/// as an error.
///
/// Only a failure to spawn git at all is an `Err`. Callers that need to
/// inspect stderr of a failed command (e.g. a rejected push) use this.
pub fn run_git_status<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitRun> {
    let output = Command::new("git")
        .current_dir(cwd.as_ref())
        .args(args)
        .output()
        .map_err(|e| {
            PushlockError::GitError(format!(
                "failed to execute git {}: {}",
                subcommand(args),
                e
            ))
        })?;

    Ok(GitRun {
        success: output.status.success(),
        code: output.status.code(),
        output: GitOutput::from_output(&output),
    })
}

/// Run a git command with the specified working directory.
///
/// # Returns
///
/// * `Ok(GitOutput)` - On successful execution (exit code 0)
/// * `Err(PushlockError::GitError)` - On non-zero exit code
pub fn run_git<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let run = run_git_status(cwd, args)?;

    if run.success {
        Ok(run.output)
    } else {
        Err(PushlockError::GitError(format!(
            "git {} failed (exit code {}): {}",
            subcommand(args),
            run.code.unwrap_or(-1),
            run.output.message()
        )))
    }
}

/// The git subcommand for error messages, skipping leading `-c key=value` pairs.
fn subcommand<'a>(args: &[&'a str]) -> &'a str {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "-c" {
            iter.next();
            continue;
        }
        return arg;
    }
    ""
}

/// Get the repository root directory using `git rev-parse --show-toplevel`.
///
/// # Returns
///
/// * `Ok(PathBuf)` - The absolute path to the repository root
/// * `Err(PushlockError::UserError)` - If not inside a git repository
pub fn get_repo_root<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let run = run_git_status(cwd.as_ref(), &["rev-parse", "--show-toplevel"]).map_err(|e| {
        PushlockError::UserError(format!("{} (is git installed?)", e))
    })?;

    if run.success {
        return Ok(PathBuf::from(&run.output.stdout));
    }

    let stderr = &run.output.stderr;
    if stderr.contains("not a git repository") || stderr.contains("fatal:") {
        Err(PushlockError::UserError(
            "not inside a git repository. Run this command from within a git repository."
                .to_string(),
        ))
    } else {
        Err(PushlockError::UserError(format!(
            "git command failed: {}",
            run.output.message()
        )))
    }
}

/// Absolute path of the repository's git directory (`.git` for a normal clone).
pub fn get_git_dir<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let cwd = cwd.as_ref();
    let output = run_git(cwd, &["rev-parse", "--git-dir"])?;
    let git_dir = PathBuf::from(&output.stdout);
    if git_dir.is_absolute() {
        Ok(git_dir)
    } else {
        Ok(cwd.join(git_dir))
    }
}

/// Resolve a revision to its full SHA, or `None` if it does not exist
/// (e.g. `HEAD` on an unborn branch).
pub fn rev_parse<P: AsRef<Path>>(cwd: P, rev: &str) -> Result<Option<String>> {
    let spec = format!("{}^{{commit}}", rev);
    let run = run_git_status(cwd, &["rev-parse", "--verify", "--quiet", &spec])?;
    if run.success && !run.output.is_empty() {
        Ok(Some(run.output.stdout))
    } else {
        Ok(None)
    }
}
