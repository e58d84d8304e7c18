//! Lock-guarded commit and push.
//!
//! Every mutation of the remote branch goes through
//! [`CoordinatedGitOperations::coordinated_commit_push`], which holds the
//! `git-commit-push` lock for the duration of the git work. The emergency path
//! skips the lock after clearing every marker and any half-finished git state.

#[cfg(test)]
mod tests;

use crate::context::RepoContext;
use crate::coordinator::{
    CoordinationOptions, CoordinationResult, CoordinationStatus, WorkflowCoordinator,
};
use crate::error::Result;
use crate::locks::{FsLockStore, LockStore};
use crate::safe_git::{GitOperationRequest, GitOperationResult, GitOptions, SafeGitOperations};
use serde::Serialize;
use tracing::{info, warn};

const LOG_TARGET: &str = "CoordinatedGitOperations";

/// Workflow name serializing all commit-and-push operations.
pub const GIT_COMMIT_PUSH_WORKFLOW: &str = "git-commit-push";

/// Outcome of a coordinated commit and push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatedResult {
    pub success: bool,
    pub git: GitOperationResult,
    pub coordination: CoordinationResult,
}

/// Outcome of an emergency commit and push.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyResult {
    pub success: bool,
    pub git: GitOperationResult,
    pub emergency: bool,
    /// Lock markers removed before committing.
    pub cleared_locks: usize,
}

/// Working-tree part of [`OperationsStatus`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    pub has_changes: bool,
    pub has_staged_changes: bool,
    pub current_branch: String,
}

/// Snapshot of working tree and locks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsStatus {
    pub git: GitStatus,
    pub coordination: CoordinationStatus,
    /// There is something to commit and at most one workflow holds a lock.
    pub ready_for_operation: bool,
}

/// Commit and push under the `git-commit-push` lock.
#[derive(Debug)]
pub struct CoordinatedGitOperations<S: LockStore = FsLockStore> {
    coordinator: WorkflowCoordinator<S>,
    git: SafeGitOperations,
}

impl CoordinatedGitOperations<FsLockStore> {
    /// Wire up the filesystem lock store and git operations for `ctx`.
    pub fn from_context(ctx: &RepoContext) -> Self {
        let coordinator = WorkflowCoordinator::new(
            FsLockStore::from_context(ctx),
            CoordinationOptions::from(&ctx.config),
        );
        let git = SafeGitOperations::new(ctx.repo_root.clone(), GitOptions::from(&ctx.config));
        Self::new(coordinator, git)
    }
}

impl<S: LockStore> CoordinatedGitOperations<S> {
    pub fn new(coordinator: WorkflowCoordinator<S>, git: SafeGitOperations) -> Self {
        Self { coordinator, git }
    }

    pub fn coordinator(&self) -> &WorkflowCoordinator<S> {
        &self.coordinator
    }

    pub fn git(&self) -> &SafeGitOperations {
        &self.git
    }

    /// Acquire the lock, commit and push, and release the lock on every exit
    /// path before reporting the outcome.
    pub fn coordinated_commit_push(&self, request: &GitOperationRequest) -> Result<CoordinatedResult> {
        let coordination = self.coordinator.coordinate_workflow(GIT_COMMIT_PUSH_WORKFLOW)?;
        info!(
            target: LOG_TARGET,
            "holding {} after waiting {}ms",
            GIT_COMMIT_PUSH_WORKFLOW,
            coordination.waited_ms
        );

        let guard = self.coordinator.guard(coordination.lock.clone());
        let outcome = self.git.safe_commit_and_push(request);
        guard.release();

        let git = outcome?;
        Ok(CoordinatedResult {
            success: git.success,
            git,
            coordination,
        })
    }

    /// Commit and push without coordination.
    ///
    /// Clears every lock marker (held or not) and any in-progress git state
    /// first. A concurrent holder may still be pushing; use only when the
    /// coordination layer itself is stuck.
    pub fn emergency_commit_push(&self, request: &GitOperationRequest) -> Result<EmergencyResult> {
        warn!(target: LOG_TARGET, "emergency commit and push: bypassing coordination");

        let cleared_locks = self.coordinator.emergency_cleanup();
        self.git.emergency_cleanup();

        let git = self.git.safe_commit_and_push(request)?;
        Ok(EmergencyResult {
            success: git.success,
            git,
            emergency: true,
            cleared_locks,
        })
    }

    /// Report working-tree state and held locks. Does not modify anything.
    pub fn get_status(&self) -> Result<OperationsStatus> {
        let git = GitStatus {
            has_changes: self.git.has_changes()?,
            has_staged_changes: self.git.has_staged_changes()?,
            current_branch: self.git.current_branch()?,
        };
        let coordination = self.coordinator.get_coordination_status()?;
        let ready_for_operation = git.has_changes && coordination.total_active_workflows <= 1;

        Ok(OperationsStatus {
            git,
            coordination,
            ready_for_operation,
        })
    }
}
