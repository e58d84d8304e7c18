//! Error types for pushlock.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Every variant has a stable `kind()` string that appears in the JSON error
//! payload printed by the CLI.

use crate::exit_codes;
use serde_json::{Value, json};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pushlock operations.
#[derive(Error, Debug)]
pub enum PushlockError {
    /// User provided invalid arguments or the repository is in an unusable state.
    #[error("{0}")]
    UserError(String),

    /// A git command failed for a reason other than a rejected push.
    #[error("Git operation failed: {0}")]
    GitError(String),

    /// A lock marker for the workflow already exists.
    ///
    /// Transient: the coordinator retries on this and never surfaces it.
    #[error("lock '{workflow}' is held by {holder} (age {age_secs}s)")]
    LockExists {
        workflow: String,
        holder: String,
        age_secs: i64,
        lock_file: PathBuf,
    },

    /// The wait budget ran out while another caller still held the lock.
    #[error(
        "timed out after {waited_ms}ms waiting for lock '{workflow}' \
         (last holder: {holder}, age {age_secs}s)"
    )]
    LockTimeout {
        workflow: String,
        holder: String,
        age_secs: i64,
        waited_ms: u64,
    },

    /// The push stayed rejected, or a rebase hit conflicts outside the
    /// request's own files. The working tree has been reset to the remote.
    #[error("Git conflict: {0}")]
    GitConflict(String),

    /// Staging produced no change. Callers convert this into a successful no-op.
    #[error("nothing to commit")]
    NothingToCommit,

    /// The lock directory cannot be created or written.
    ///
    /// Use `pushlock emergency-commit-push` to bypass coordination.
    #[error("Coordination unavailable: {0}")]
    CoordinationUnavailable(String),
}

impl PushlockError {
    /// Stable machine-readable identifier for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            PushlockError::UserError(_) => "user_error",
            PushlockError::GitError(_) => "git_error",
            PushlockError::LockExists { .. } => "lock_exists",
            PushlockError::LockTimeout { .. } => "lock_timeout",
            PushlockError::GitConflict(_) => "git_conflict",
            PushlockError::NothingToCommit => "nothing_to_commit",
            PushlockError::CoordinationUnavailable(_) => "coordination_unavailable",
        }
    }

    /// Returns the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        exit_codes::FAILURE
    }

    /// JSON payload written to stdout when a command fails.
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

/// Result type alias for pushlock operations.
pub type Result<T> = std::result::Result<T, PushlockError>;
