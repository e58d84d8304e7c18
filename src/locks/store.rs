//! Lock marker creation, discovery and removal.

use super::metadata::LockRecord;
use super::types::LockHandle;
use crate::context::RepoContext;
use crate::error::{PushlockError, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const LOG_TARGET: &str = "LockStore";

/// Extension of lock marker files.
const LOCK_EXTENSION: &str = "lock";

/// Workflow names with this prefix live in the git locks directory.
const GIT_WORKFLOW_PREFIX: &str = "git-";

/// Persistence for lock markers. The coordinator only sees this trait.
pub trait LockStore: Send + Sync {
    /// Atomically create the marker for `workflow_name`.
    ///
    /// Fails with `LockExists` if a marker is already present, stale or not;
    /// judging staleness is the caller's decision.
    fn create(&self, workflow_name: &str, lock_id: &str, ttl: Duration) -> Result<LockHandle>;

    /// Read the record at `lock_file`, or `None` if there is no marker.
    fn read(&self, lock_file: &Path) -> Result<Option<LockRecord>>;

    /// Whether the marker at `lock_file` is older than `ttl`.
    /// An absent marker is not stale.
    fn is_stale(&self, lock_file: &Path, ttl: Duration) -> Result<bool> {
        Ok(self
            .read(lock_file)?
            .is_some_and(|record| record.is_stale(ttl)))
    }

    /// Remove the marker belonging to `handle`.
    ///
    /// Idempotent: an absent marker is a no-op. A marker that now belongs to
    /// another acquisition is left in place. Returns whether a file was deleted.
    fn remove(&self, handle: &LockHandle) -> Result<bool>;

    /// Non-stale locks, optionally filtered by workflow-name prefix, sorted by name.
    fn list_active(&self, prefix: Option<&str>, ttl: Duration) -> Result<Vec<LockRecord>>;

    /// Delete every marker regardless of age or owner. Returns how many were removed.
    fn emergency_clear(&self) -> Result<usize>;
}

/// Lock markers as files in two directories of the shared checkout.
#[derive(Debug, Clone)]
pub struct FsLockStore {
    git_locks_dir: PathBuf,
    workflow_locks_dir: PathBuf,
}

impl FsLockStore {
    pub fn new(git_locks_dir: PathBuf, workflow_locks_dir: PathBuf) -> Self {
        Self {
            git_locks_dir,
            workflow_locks_dir,
        }
    }

    pub fn from_context(ctx: &RepoContext) -> Self {
        Self::new(ctx.git_locks_dir.clone(), ctx.workflow_locks_dir.clone())
    }

    /// Directory holding markers for `workflow_name`.
    pub fn lock_dir_for(&self, workflow_name: &str) -> &Path {
        if workflow_name.starts_with(GIT_WORKFLOW_PREFIX) {
            &self.git_locks_dir
        } else {
            &self.workflow_locks_dir
        }
    }

    /// Marker path for `workflow_name`.
    ///
    /// Names are restricted to `[A-Za-z0-9._-]` and may not start with a dot,
    /// so a name can never escape the lock directory.
    pub fn lock_path(&self, workflow_name: &str) -> Result<PathBuf> {
        validate_workflow_name(workflow_name)?;
        Ok(self
            .lock_dir_for(workflow_name)
            .join(format!("{}.{}", workflow_name, LOCK_EXTENSION)))
    }

    fn dirs(&self) -> [&Path; 2] {
        [&self.git_locks_dir, &self.workflow_locks_dir]
    }

    /// Paths of all marker files currently present, in both directories.
    fn marker_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        for dir in self.dirs() {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(PushlockError::CoordinationUnavailable(format!(
                        "failed to read locks directory '{}': {}",
                        dir.display(),
                        e
                    )));
                }
            };

            for entry in entries {
                let entry = entry.map_err(|e| {
                    PushlockError::CoordinationUnavailable(format!(
                        "failed to read locks directory entry: {}",
                        e
                    ))
                })?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(LOCK_EXTENSION) {
                    paths.push(path);
                }
            }
        }

        Ok(paths)
    }
}

impl LockStore for FsLockStore {
    fn create(&self, workflow_name: &str, lock_id: &str, ttl: Duration) -> Result<LockHandle> {
        let lock_path = self.lock_path(workflow_name)?;
        ensure_lock_dir(self.lock_dir_for(workflow_name))?;

        let record = LockRecord::new(workflow_name, lock_id, ttl);

        // Try to create the lock file exclusively
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = self.read(&lock_path).ok().flatten();
                return Err(PushlockError::LockExists {
                    workflow: workflow_name.to_string(),
                    holder: holder
                        .as_ref()
                        .map(LockRecord::holder)
                        .unwrap_or_else(|| "unknown".to_string()),
                    age_secs: holder.as_ref().map(LockRecord::age_secs).unwrap_or(0),
                    lock_file: lock_path,
                });
            }
            Err(e) => {
                return Err(PushlockError::CoordinationUnavailable(format!(
                    "failed to create lock '{}': {}",
                    lock_path.display(),
                    e
                )));
            }
        };

        let json = record.to_json().map_err(|e| {
            let _ = fs::remove_file(&lock_path);
            PushlockError::CoordinationUnavailable(format!("failed to serialize lock record: {}", e))
        })?;

        if let Err(e) = file.write_all(json.as_bytes()).and_then(|_| file.sync_all()) {
            // Clean up the lock file on write failure
            let _ = fs::remove_file(&lock_path);
            return Err(PushlockError::CoordinationUnavailable(format!(
                "failed to write lock '{}': {}",
                lock_path.display(),
                e
            )));
        }

        debug!(target: LOG_TARGET, "created {} for {}", lock_path.display(), lock_id);
        Ok(LockHandle::for_record(lock_path, &record))
    }

    fn read(&self, lock_file: &Path) -> Result<Option<LockRecord>> {
        read_marker(lock_file)
    }

    fn remove(&self, handle: &LockHandle) -> Result<bool> {
        let Some(current) = self.read(&handle.lock_file)? else {
            return Ok(false);
        };

        if !handle.owns(&current) {
            warn!(
                target: LOG_TARGET,
                "not removing {}: now held by {}, not {}",
                handle.lock_file.display(),
                current.holder(),
                handle.lock_id
            );
            return Ok(false);
        }

        match fs::remove_file(&handle.lock_file) {
            Ok(()) => {
                debug!(target: LOG_TARGET, "removed {}", handle.lock_file.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PushlockError::CoordinationUnavailable(format!(
                "failed to remove lock '{}': {}",
                handle.lock_file.display(),
                e
            ))),
        }
    }

    fn list_active(&self, prefix: Option<&str>, ttl: Duration) -> Result<Vec<LockRecord>> {
        let mut locks = Vec::new();

        for path in self.marker_paths()? {
            let Some(record) = read_marker(&path)? else {
                continue; // Released while listing
            };
            if record.is_stale(ttl) {
                continue;
            }
            if let Some(prefix) = prefix
                && !record.workflow_name.starts_with(prefix)
            {
                continue;
            }
            locks.push(record);
        }

        // Sort by name for consistent output
        locks.sort_by(|a, b| a.workflow_name.cmp(&b.workflow_name));
        Ok(locks)
    }

    fn emergency_clear(&self) -> Result<usize> {
        let mut removed = 0;

        for path in self.marker_paths()? {
            match fs::remove_file(&path) {
                Ok(()) => {
                    warn!(target: LOG_TARGET, "force-removed {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(target: LOG_TARGET, "failed to force-remove {}: {}", path.display(), e);
                }
            }
        }

        Ok(removed)
    }
}

fn validate_workflow_name(workflow_name: &str) -> Result<()> {
    let valid_chars = workflow_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if workflow_name.is_empty() || workflow_name.starts_with('.') || !valid_chars {
        return Err(PushlockError::UserError(format!(
            "invalid workflow name '{}': use letters, digits, '.', '_' or '-', not starting with '.'",
            workflow_name
        )));
    }
    Ok(())
}

/// Create the lock directory and its `.gitignore` if missing.
fn ensure_lock_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        PushlockError::CoordinationUnavailable(format!(
            "failed to create locks directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let gitignore = dir.join(".gitignore");
    if !gitignore.exists() {
        fs::write(&gitignore, "*\n").map_err(|e| {
            PushlockError::CoordinationUnavailable(format!(
                "failed to write '{}': {}",
                gitignore.display(),
                e
            ))
        })?;
    }

    Ok(())
}

/// Read a marker, tolerating markers that vanish or hold garbage.
fn read_marker(path: &Path) -> Result<Option<LockRecord>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PushlockError::CoordinationUnavailable(format!(
                "failed to read lock '{}': {}",
                path.display(),
                e
            )));
        }
    };

    if let Ok(record) = serde_json::from_str::<LockRecord>(&content) {
        return Ok(Some(record));
    }

    // Created but never (fully) written: age it by modification time.
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PushlockError::CoordinationUnavailable(format!(
                "failed to stat lock '{}': {}",
                path.display(),
                e
            )));
        }
    };

    let workflow_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    Ok(Some(LockRecord::unreadable(
        workflow_name,
        DateTime::<Utc>::from(modified),
    )))
}
