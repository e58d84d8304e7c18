//! Config struct definition and default implementation.

use super::types::ConflictStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for pushlock.
///
/// This struct represents the contents of `.pushlock.yaml` at the repository
/// root. Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Seconds after which a lock marker is considered abandoned.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Maximum cumulative seconds to wait for a held lock.
    #[serde(default = "default_lock_max_wait_secs")]
    pub lock_max_wait_secs: u64,

    /// First backoff delay between lock attempts, in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Upper bound for a single backoff delay, in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Directory for git-operation locks, relative to the repo root.
    #[serde(default = "default_git_locks_dir")]
    pub git_locks_dir: String,

    /// Directory for general workflow locks, relative to the repo root.
    #[serde(default = "default_workflow_locks_dir")]
    pub workflow_locks_dir: String,

    // =========================================================================
    // Git settings
    // =========================================================================
    /// Name of the remote to push to (default: "origin").
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Total push attempts, including the first, before giving up.
    #[serde(default = "default_max_push_attempts")]
    pub max_push_attempts: u32,

    /// Behavior when the remote branch has diverged.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,

    /// Commit author email used when a request does not provide one.
    #[serde(default = "default_user_email")]
    pub user_email: String,

    /// Commit author name used when a request does not provide one.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Paths staged when a request does not list any.
    #[serde(default = "default_add_files")]
    pub add_files: Vec<String>,
}

// Default value functions for serde
fn default_lock_ttl_secs() -> u64 {
    600
}
fn default_lock_max_wait_secs() -> u64 {
    120
}
fn default_backoff_initial_ms() -> u64 {
    250
}
fn default_backoff_max_ms() -> u64 {
    5_000
}
fn default_git_locks_dir() -> String {
    ".locks/git".to_string()
}
fn default_workflow_locks_dir() -> String {
    ".locks/workflows".to_string()
}
fn default_remote() -> String {
    "origin".to_string()
}
fn default_max_push_attempts() -> u32 {
    3
}
fn default_user_email() -> String {
    "41898282+github-actions[bot]@users.noreply.github.com".to_string()
}
fn default_user_name() -> String {
    "github-actions[bot]".to_string()
}
fn default_add_files() -> Vec<String> {
    vec![".".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_max_wait_secs: default_lock_max_wait_secs(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            git_locks_dir: default_git_locks_dir(),
            workflow_locks_dir: default_workflow_locks_dir(),
            remote: default_remote(),
            max_push_attempts: default_max_push_attempts(),
            conflict_strategy: ConflictStrategy::default(),
            user_email: default_user_email(),
            user_name: default_user_name(),
            add_files: default_add_files(),
        }
    }
}
