//! Lock handle definitions.

use super::metadata::LockRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// What a successful acquirer holds and later hands back for release.
///
/// Two acquisitions of the same workflow share a marker path but never a
/// `lock_id`, so a handle identifies exactly one acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHandle {
    /// The lock marker path.
    pub lock_file: PathBuf,

    /// The workflow this lock serializes.
    pub workflow_name: String,

    /// The acquisition token written into the marker.
    pub lock_id: String,

    /// When the marker was created.
    pub acquired_at: DateTime<Utc>,
}

impl LockHandle {
    /// Handle for the acquisition described by `record` at `lock_file`.
    pub fn for_record(lock_file: PathBuf, record: &LockRecord) -> Self {
        Self {
            lock_file,
            workflow_name: record.workflow_name.clone(),
            lock_id: record.lock_id.clone(),
            acquired_at: record.acquired_at,
        }
    }

    /// Whether the marker currently holding `current` is this acquisition.
    ///
    /// Unreadable markers carry no id, so they are matched by their
    /// modification time instead.
    pub fn owns(&self, current: &LockRecord) -> bool {
        if current.lock_id.is_empty() {
            self.lock_id.is_empty() && self.acquired_at == current.acquired_at
        } else {
            self.lock_id == current.lock_id
        }
    }
}
