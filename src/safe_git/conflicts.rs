//! Push rejection recognition and the owned-path conflict policy.

use crate::error::{PushlockError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::sync::LazyLock;

/// Matches git's stderr when a push lost a race with another writer.
static PUSH_REJECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[rejected\]|non-fast-forward|\(fetch first\)|updates were rejected because")
        .expect("push rejection pattern is valid")
});

/// Whether a failed push was rejected because the remote branch moved,
/// as opposed to a network, auth or hook failure.
pub fn is_push_rejection(stderr: &str) -> bool {
    PUSH_REJECTED.is_match(stderr)
}

/// Paths a request explicitly stages, used to decide which rebase conflicts
/// may be resolved with the local version.
///
/// Each entry matches itself and everything below it. Whole-tree entries such
/// as `.` own nothing, so a request that stages everything never overrides
/// another writer's changes.
#[derive(Debug)]
pub struct OwnedPaths {
    set: GlobSet,
    count: usize,
}

impl OwnedPaths {
    pub fn new(add_files: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut count = 0;

        for entry in add_files {
            let Some(pattern) = normalize(entry) else {
                continue;
            };
            for candidate in [pattern.to_string(), format!("{}/**", pattern)] {
                let glob = GlobBuilder::new(&candidate)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| {
                        PushlockError::UserError(format!("invalid path pattern '{}': {}", entry, e))
                    })?;
                builder.add(glob);
            }
            count += 1;
        }

        let set = builder
            .build()
            .map_err(|e| PushlockError::UserError(format!("invalid path patterns: {}", e)))?;
        Ok(Self { set, count })
    }

    /// Whether `path` (relative to the repository root) is owned.
    pub fn is_owned(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    /// True when no entry claims ownership of anything.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Strip `./` prefixes and trailing slashes; `None` for whole-tree entries.
fn normalize(entry: &str) -> Option<&str> {
    let mut path = entry.trim();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    let path = path.trim_end_matches('/');

    match path {
        "" | "." | "*" | "**" | ":/" => None,
        _ => Some(path),
    }
}
