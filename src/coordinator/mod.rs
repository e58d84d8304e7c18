//! Wait-and-acquire protocol over a [`LockStore`].
//!
//! One acquisition moves through
//! `Idle -> Requesting -> (Locked | Waiting -> Requesting)* -> (Locked | TimedOut)`.
//! A marker older than the ttl is reclaimed on the spot; a live one is polled
//! with exponential backoff and jitter until the wait budget runs out. Waiting
//! never creates a marker, so an abandoned wait leaves nothing behind.

mod backoff;


use crate::config::Config;
use crate::error::{PushlockError, Result};
use crate::locks::{FsLockStore, LockHandle, LockRecord, LockStore, generate_lock_id};
use backoff::Backoff;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LOG_TARGET: &str = "WorkflowCoordinator";

/// Stale reclaims and vanished holders are retried without sleeping, but
/// only this many times in a row.
const MAX_IMMEDIATE_RETRIES: u32 = 16;

/// Timing policy for one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationOptions {
    /// Age after which a marker is abandoned and reclaimable.
    pub ttl: Duration,
    /// Cumulative sleep allowed before giving up.
    pub max_wait: Duration,
    /// First backoff delay.
    pub initial_backoff: Duration,
    /// Cap for a single backoff delay.
    pub max_backoff: Duration,
}

impl Default for CoordinationOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CoordinationOptions {
    fn from(config: &Config) -> Self {
        Self {
            ttl: config.lock_ttl(),
            max_wait: config.lock_max_wait(),
            initial_backoff: config.backoff_initial(),
            max_backoff: config.backoff_max(),
        }
    }
}

/// A successful acquisition.
///
/// Every acquisition of a workflow uses the same `lockFile`; `lockId` is what
/// distinguishes one acquisition from the next.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationResult {
    /// Total time slept waiting for other holders.
    pub waited_ms: u64,
    /// Number of create attempts, including the successful one.
    pub attempts: u32,
    /// Handle needed for release.
    #[serde(flatten)]
    pub lock: LockHandle,
}

/// One active lock in a status report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLock {
    pub workflow_name: String,
    pub lock_id: String,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub acquired_at: DateTime<Utc>,
    pub age_seconds: i64,
}

impl From<LockRecord> for ActiveLock {
    fn from(record: LockRecord) -> Self {
        let age_seconds = record.age_secs();
        Self {
            workflow_name: record.workflow_name,
            lock_id: record.lock_id,
            owner: record.owner,
            pid: record.pid,
            acquired_at: record.acquired_at,
            age_seconds,
        }
    }
}

/// Read-only snapshot of all non-stale locks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationStatus {
    pub total_active_workflows: usize,
    pub locks: Vec<ActiveLock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptState {
    Idle,
    Requesting,
    Waiting,
    Locked,
    TimedOut,
}

/// Serializes named workflows across processes.
#[derive(Debug)]
pub struct WorkflowCoordinator<S: LockStore = FsLockStore> {
    store: S,
    options: CoordinationOptions,
}

impl<S: LockStore> WorkflowCoordinator<S> {
    pub fn new(store: S, options: CoordinationOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &CoordinationOptions {
        &self.options
    }

    /// Acquire `workflow_name` with the coordinator's default options.
    pub fn coordinate_workflow(&self, workflow_name: &str) -> Result<CoordinationResult> {
        self.coordinate_workflow_with(workflow_name, &self.options)
    }

    /// Acquire `workflow_name`, waiting for other holders if necessary.
    ///
    /// # Returns
    ///
    /// * `Ok(CoordinationResult)` - The lock is held; release it with
    ///   [`release_workflow_lock`](Self::release_workflow_lock)
    /// * `Err(PushlockError::LockTimeout)` - Another holder kept the lock for
    ///   the whole wait budget
    /// * `Err(PushlockError::CoordinationUnavailable)` - The store is unusable
    pub fn coordinate_workflow_with(
        &self,
        workflow_name: &str,
        options: &CoordinationOptions,
    ) -> Result<CoordinationResult> {
        let lock_id = generate_lock_id();
        let mut backoff = Backoff::new(options.initial_backoff, options.max_backoff);
        let mut waited = Duration::ZERO;
        let mut attempts = 0u32;
        let mut immediate_retries = 0u32;
        let mut state = AttemptState::Idle;

        loop {
            state = transition(workflow_name, state, AttemptState::Requesting);
            attempts += 1;

            let (lock_file, mut holder, mut age_secs) =
                match self.store.create(workflow_name, &lock_id, options.ttl) {
                    Ok(lock) => {
                        transition(workflow_name, state, AttemptState::Locked);
                        info!(
                            target: LOG_TARGET,
                            "acquired '{}' as {} after {}ms ({} attempts)",
                            workflow_name,
                            lock_id,
                            waited.as_millis(),
                            attempts
                        );
                        return Ok(CoordinationResult {
                            waited_ms: duration_ms(waited),
                            attempts,
                            lock,
                        });
                    }
                    Err(PushlockError::LockExists {
                        lock_file,
                        holder,
                        age_secs,
                        ..
                    }) => (lock_file, holder, age_secs),
                    Err(e) => return Err(e),
                };

            if immediate_retries < MAX_IMMEDIATE_RETRIES {
                match self.store.read(&lock_file)? {
                    None => {
                        // Released between our create and read.
                        immediate_retries += 1;
                        continue;
                    }
                    Some(record) if record.is_stale(options.ttl) => {
                        warn!(
                            target: LOG_TARGET,
                            "reclaiming stale lock '{}' held by {} for {}",
                            workflow_name,
                            record.holder(),
                            record.age_string()
                        );
                        self.store
                            .remove(&LockHandle::for_record(lock_file, &record))?;
                        immediate_retries += 1;
                        continue;
                    }
                    Some(record) => {
                        holder = record.holder();
                        age_secs = record.age_secs();
                    }
                }
            }

            if waited >= options.max_wait {
                transition(workflow_name, state, AttemptState::TimedOut);
                return Err(PushlockError::LockTimeout {
                    workflow: workflow_name.to_string(),
                    holder,
                    age_secs,
                    waited_ms: duration_ms(waited),
                });
            }

            state = transition(workflow_name, state, AttemptState::Waiting);
            let delay = backoff.next_delay(options.max_wait - waited);
            debug!(
                target: LOG_TARGET,
                "'{}' held by {} ({}s old), retrying in {}ms",
                workflow_name,
                holder,
                age_secs,
                delay.as_millis()
            );
            thread::sleep(delay);
            waited += delay;
            immediate_retries = 0;
        }
    }

    /// Release a lock obtained from [`coordinate_workflow`](Self::coordinate_workflow).
    ///
    /// Never fails: releasing twice, or after someone reclaimed the lock as
    /// stale, is a no-op. Store errors are logged. Returns whether a marker
    /// was deleted.
    pub fn release_workflow_lock(&self, lock: &LockHandle) -> bool {
        match self.store.remove(lock) {
            Ok(true) => {
                info!(target: LOG_TARGET, "released '{}' ({})", lock.workflow_name, lock.lock_id);
                true
            }
            Ok(false) => {
                debug!(
                    target: LOG_TARGET,
                    "'{}' ({}) was already released",
                    lock.workflow_name,
                    lock.lock_id
                );
                false
            }
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    "failed to release '{}' ({}): {}",
                    lock.workflow_name,
                    lock.lock_id,
                    e
                );
                false
            }
        }
    }

    /// Release `lock` when the returned guard goes out of scope, including
    /// during panic unwinding.
    pub fn guard(&self, lock: LockHandle) -> WorkflowLockGuard<'_, S> {
        WorkflowLockGuard {
            coordinator: self,
            lock: Some(lock),
        }
    }

    /// Snapshot of all non-stale locks.
    pub fn get_coordination_status(&self) -> Result<CoordinationStatus> {
        let locks: Vec<ActiveLock> = self
            .store
            .list_active(None, self.options.ttl)?
            .into_iter()
            .map(ActiveLock::from)
            .collect();

        Ok(CoordinationStatus {
            total_active_workflows: locks.len(),
            locks,
        })
    }

    /// Delete every lock marker, held or not. Last resort only.
    ///
    /// Never fails; returns how many markers were removed.
    pub fn emergency_cleanup(&self) -> usize {
        warn!(
            target: LOG_TARGET,
            "emergency cleanup: removing all lock markers, including any still legitimately held"
        );
        match self.store.emergency_clear() {
            Ok(removed) => {
                warn!(target: LOG_TARGET, "emergency cleanup removed {} lock(s)", removed);
                removed
            }
            Err(e) => {
                error!(target: LOG_TARGET, "emergency cleanup failed: {}", e);
                0
            }
        }
    }
}

/// Releases a held workflow lock on drop.
#[derive(Debug)]
pub struct WorkflowLockGuard<'a, S: LockStore> {
    coordinator: &'a WorkflowCoordinator<S>,
    lock: Option<LockHandle>,
}

impl<S: LockStore> WorkflowLockGuard<'_, S> {
    /// Release now rather than at end of scope.
    pub fn release(mut self) -> bool {
        match self.lock.take() {
            Some(lock) => self.coordinator.release_workflow_lock(&lock),
            None => false,
        }
    }
}

impl<S: LockStore> Drop for WorkflowLockGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            self.coordinator.release_workflow_lock(&lock);
        }
    }
}

fn transition(workflow_name: &str, from: AttemptState, to: AttemptState) -> AttemptState {
    if from != to {
        debug!(target: LOG_TARGET, "'{}': {:?} -> {:?}", workflow_name, from, to);
    }
    to
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
