//! Configuration enum types.

use serde::{Deserialize, Serialize};

/// What to do when a push is rejected because the remote branch moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Fetch, rebase the local commit onto the remote tip, and keep the local
    /// version of conflicted files the request explicitly owns (default).
    ///
    /// Only sound when concurrent pipelines touch largely disjoint files.
    #[default]
    PreferLocal,
    /// Never rebase: the first rejection resets to the remote and fails.
    FailFast,
}

impl ConflictStrategy {
    /// Parse a conflict strategy from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "prefer_local" => Some(Self::PreferLocal),
            "fail_fast" => Some(Self::FailFast),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreferLocal => "prefer_local",
            Self::FailFast => "fail_fast",
        }
    }
}
