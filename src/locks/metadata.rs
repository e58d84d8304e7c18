//! Lock record structures and utilities.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

/// Environment variables that identify a CI run, checked in order.
const RUN_ID_VARS: &[&str] = &["GITHUB_RUN_ID", "CI_PIPELINE_ID", "BUILD_ID"];

/// One held lock, as stored in its marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Logical resource class being serialized (e.g. `git-commit-push`).
    pub workflow_name: String,

    /// Unique token for this acquisition. Empty for a marker whose content
    /// could not be parsed.
    pub lock_id: String,

    /// Owner of the lock (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the lock holder (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the lock was created (RFC3339).
    pub acquired_at: DateTime<Utc>,

    /// Maximum age the holder declared for this lock, in seconds.
    pub ttl_secs: u64,
}

impl LockRecord {
    /// Create a new record owned by this process with the current timestamp.
    pub fn new(workflow_name: &str, lock_id: &str, ttl: StdDuration) -> Self {
        Self {
            workflow_name: workflow_name.to_string(),
            lock_id: lock_id.to_string(),
            owner: get_owner_string(),
            pid: Some(std::process::id()),
            acquired_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Stand-in for a marker that exists but holds no parseable record,
    /// e.g. after a crash between create and write. Its age comes from the
    /// file's modification time.
    pub fn unreadable(workflow_name: &str, modified_at: DateTime<Utc>) -> Self {
        Self {
            workflow_name: workflow_name.to_string(),
            lock_id: String::new(),
            owner: "unknown".to_string(),
            pid: None,
            acquired_at: modified_at,
            ttl_secs: 0,
        }
    }

    /// Serialize the record to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Calculate the age of the lock.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Age in whole seconds. A timestamp in the future counts as zero.
    pub fn age_secs(&self) -> i64 {
        self.age().num_seconds().max(0)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let seconds = age.num_seconds().max(0);
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Whether the lock is older than `ttl`.
    pub fn is_stale(&self, ttl: StdDuration) -> bool {
        // Negative age (clock skew between machines) never counts as stale.
        match self.age().to_std() {
            Ok(age) => age > ttl,
            Err(_) => false,
        }
    }

    /// Identifier used in diagnostics: the lock id, or a description of an
    /// unreadable marker.
    pub fn holder(&self) -> String {
        if self.lock_id.is_empty() {
            format!("unreadable marker for '{}'", self.workflow_name)
        } else {
            self.lock_id.clone()
        }
    }
}

impl std::fmt::Display for LockRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (id: {}, owner: {}, age: {})",
            self.workflow_name,
            self.holder(),
            self.owner,
            self.age_string()
        )
    }
}

/// Generate a unique lock id: run identifier, process id, millisecond
/// timestamp and a random suffix.
pub fn generate_lock_id() -> String {
    let run = RUN_ID_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .map(|id| format!("run{}", id.trim()))
        .unwrap_or_else(get_host_string);

    let suffix: u32 = rand::rng().random();
    format!(
        "{}-{}-{}-{:08x}",
        run,
        std::process::id(),
        Utc::now().timestamp_millis(),
        suffix
    )
}

fn get_host_string() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Get the owner string for lock records.
fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, get_host_string())
}
