//! Commit and push with bounded recovery from concurrent pushes.
//!
//! A rejected push is recovered by fetching the remote branch and rebasing the
//! single local commit onto it. Whatever happens, the branch never ends up
//! with a local-only commit: it is either pushed, rewound to its parent with
//! the changes left in the working tree, or hard-reset to the remote tip.

mod conflicts;


use crate::config::{Config, ConflictStrategy};
use crate::error::{PushlockError, Result};
use crate::git::{self, run_git, run_git_status};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use conflicts::{OwnedPaths, is_push_rejection};

const LOG_TARGET: &str = "SafeGitOperations";

/// What `git symbolic-ref`-based branch lookup reports for a detached HEAD.
pub const DETACHED_HEAD: &str = "HEAD";

/// Message of the stash entry holding edits that could not be reapplied.
const STASH_MESSAGE: &str = "pushlock: uncommitted edits";

/// Upper bound on `rebase --continue` rounds for one rebase.
const MAX_CONFLICT_ROUNDS: usize = 32;

/// Push and recovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOptions {
    pub remote: String,
    /// Total push attempts, including the first.
    pub max_push_attempts: u32,
    pub conflict_strategy: ConflictStrategy,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for GitOptions {
    fn from(config: &Config) -> Self {
        Self {
            remote: config.remote.clone(),
            max_push_attempts: config.max_push_attempts,
            conflict_strategy: config.conflict_strategy,
        }
    }
}

/// One commit-and-push request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOperationRequest {
    pub message: String,
    pub user_email: String,
    pub user_name: String,
    /// Paths to stage, relative to the repository root.
    pub add_files: Vec<String>,
}

impl GitOperationRequest {
    /// A request with identity and staged paths taken from `config`.
    pub fn new(message: impl Into<String>, config: &Config) -> Self {
        Self {
            message: message.into(),
            user_email: config.user_email.clone(),
            user_name: config.user_name.clone(),
            add_files: config.add_files.clone(),
        }
    }

    /// Override the commit identity where given.
    pub fn with_identity(mut self, email: Option<String>, name: Option<String>) -> Self {
        if let Some(email) = email {
            self.user_email = email;
        }
        if let Some(name) = name {
            self.user_name = name;
        }
        self
    }

    /// Override the staged paths; an empty list keeps the defaults.
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        if !files.is_empty() {
            self.add_files = files;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(PushlockError::UserError(
                "commit message must not be empty".to_string(),
            ));
        }
        if self.user_email.trim().is_empty() || self.user_name.trim().is_empty() {
            return Err(PushlockError::UserError(
                "git identity is not configured: both user email and user name are required"
                    .to_string(),
            ));
        }
        if self.add_files.iter().any(|f| f.trim().is_empty()) {
            return Err(PushlockError::UserError(
                "paths to stage must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// `-c` overrides applying the request's identity to a single git command.
    fn identity_args(&self) -> [String; 4] {
        [
            "-c".to_string(),
            format!("user.email={}", self.user_email),
            "-c".to_string(),
            format!("user.name={}", self.user_name),
        ]
    }

    fn paths(&self) -> Vec<&str> {
        if self.add_files.is_empty() {
            vec!["."]
        } else {
            self.add_files.iter().map(String::as_str).collect()
        }
    }
}

/// Outcome of [`SafeGitOperations::safe_commit_and_push`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOperationResult {
    pub success: bool,
    pub pushed: bool,
    /// Re-push attempts after the first push.
    pub retries: u32,
    pub commit_created: bool,
}

impl GitOperationResult {
    fn pushed(retries: u32) -> Self {
        Self {
            success: true,
            pushed: true,
            retries,
            commit_created: true,
        }
    }

    fn nothing_to_commit() -> Self {
        Self {
            success: true,
            pushed: false,
            retries: 0,
            commit_created: false,
        }
    }
}

/// Git mutations on one working tree.
#[derive(Debug, Clone)]
pub struct SafeGitOperations {
    repo_root: PathBuf,
    options: GitOptions,
}

impl SafeGitOperations {
    pub fn new(repo_root: impl Into<PathBuf>, options: GitOptions) -> Self {
        Self {
            repo_root: repo_root.into(),
            options,
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn options(&self) -> &GitOptions {
        &self.options
    }

    /// Whether the working tree has any tracked or untracked change.
    pub fn has_changes(&self) -> Result<bool> {
        let output = run_git(&self.repo_root, &["status", "--porcelain"])?;
        Ok(!output.is_empty())
    }

    /// Whether the index differs from HEAD.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let output = run_git(&self.repo_root, &["diff", "--cached", "--name-only"])?;
        Ok(!output.is_empty())
    }

    /// The checked-out branch, or [`DETACHED_HEAD`] when HEAD is detached.
    ///
    /// Works on an unborn branch, unlike `rev-parse --abbrev-ref HEAD`.
    pub fn current_branch(&self) -> Result<String> {
        let run = run_git_status(&self.repo_root, &["symbolic-ref", "--short", "-q", "HEAD"])?;
        if run.success {
            Ok(run.output.stdout)
        } else if run.code == Some(1) {
            Ok(DETACHED_HEAD.to_string())
        } else {
            Err(PushlockError::GitError(format!(
                "failed to determine current branch: {}",
                run.output.message()
            )))
        }
    }

    /// Stage, commit and push `request`.
    ///
    /// # Returns
    ///
    /// * `Ok(GitOperationResult)` - Pushed, or nothing to commit (`pushed: false`)
    /// * `Err(PushlockError::UserError)` - Bad request or detached HEAD
    /// * `Err(PushlockError::GitConflict)` - Push stayed rejected; the branch
    ///   was reset to the remote tip
    /// * `Err(PushlockError::GitError)` - Any other git failure; the local
    ///   commit was undone and its changes left in the working tree
    pub fn safe_commit_and_push(&self, request: &GitOperationRequest) -> Result<GitOperationResult> {
        match self.commit_and_push(request) {
            Err(PushlockError::NothingToCommit) => {
                info!(target: LOG_TARGET, "nothing to commit for {:?}", request.paths());
                Ok(GitOperationResult::nothing_to_commit())
            }
            other => other,
        }
    }

    fn commit_and_push(&self, request: &GitOperationRequest) -> Result<GitOperationResult> {
        request.validate()?;

        let branch = self.current_branch()?;
        if branch == DETACHED_HEAD {
            return Err(PushlockError::UserError(
                "HEAD is detached; check out a branch before committing".to_string(),
            ));
        }
        let owned = OwnedPaths::new(&request.add_files)?;

        let pre_commit = git::rev_parse(&self.repo_root, "HEAD")?;
        self.commit(request)?;
        info!(target: LOG_TARGET, "committed on {}: {}", branch, request.message.trim());

        let refspec = format!("HEAD:refs/heads/{}", branch);
        let remote = self.options.remote.as_str();
        let max_attempts = self.options.max_push_attempts.max(1);
        // Parent of the local commit; moves to the remote tip after each rebase.
        let mut base = pre_commit;
        let mut retries = 0u32;

        loop {
            let run = match run_git_status(&self.repo_root, &["push", remote, &refspec]) {
                Ok(run) => run,
                Err(e) => {
                    self.undo_commit(base.as_deref());
                    return Err(e);
                }
            };

            if run.success {
                info!(
                    target: LOG_TARGET,
                    "pushed {} to {} after {} retries",
                    branch,
                    remote,
                    retries
                );
                return Ok(GitOperationResult::pushed(retries));
            }

            let stderr = run.output.message();
            if !is_push_rejection(stderr) {
                self.undo_commit(base.as_deref());
                return Err(PushlockError::GitError(format!(
                    "push to {} failed (exit code {}): {}",
                    remote,
                    run.code.unwrap_or(-1),
                    stderr
                )));
            }

            if self.options.conflict_strategy == ConflictStrategy::FailFast {
                return Err(self.abandon(
                    &branch,
                    request,
                    base.as_deref(),
                    format!("push to {} rejected and conflict strategy is fail_fast", remote),
                ));
            }

            if retries + 1 >= max_attempts {
                return Err(self.abandon(
                    &branch,
                    request,
                    base.as_deref(),
                    format!("push to {} still rejected after {} attempts", remote, retries + 1),
                ));
            }

            retries += 1;
            warn!(
                target: LOG_TARGET,
                "push rejected (attempt {}/{}), rebasing onto {}/{}",
                retries,
                max_attempts,
                remote,
                branch
            );
            base = Some(self.rebase_onto_remote(&branch, &owned, request, base.as_deref())?);
        }
    }

    /// Stage the request's paths and commit them.
    fn commit(&self, request: &GitOperationRequest) -> Result<()> {
        let mut add_args = vec!["add", "-A", "--"];
        add_args.extend(request.paths());
        run_git(&self.repo_root, &add_args)?;

        if !self.has_staged_changes()? {
            return Err(PushlockError::NothingToCommit);
        }

        let identity = request.identity_args();
        let mut commit_args: Vec<&str> = identity.iter().map(String::as_str).collect();
        commit_args.extend(["commit", "-q", "-m", request.message.as_str()]);

        if let Err(e) = run_git(&self.repo_root, &commit_args) {
            // Leave nothing staged behind a failed commit.
            if let Err(reset_err) = run_git(&self.repo_root, &["reset", "-q"]) {
                warn!(target: LOG_TARGET, "failed to unstage after failed commit: {}", reset_err);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Fetch the remote branch and return the SHA of its tip.
    fn fetch_tip(&self, branch: &str) -> Result<String> {
        let remote = self.options.remote.as_str();
        run_git(&self.repo_root, &["fetch", "-q", remote, branch]).map_err(|e| {
            PushlockError::GitError(format!("failed to fetch {}/{}: {}", remote, branch, e))
        })?;

        git::rev_parse(&self.repo_root, "FETCH_HEAD")?.ok_or_else(|| {
            PushlockError::GitError(format!(
                "fetch of {}/{} did not produce a commit",
                remote, branch
            ))
        })
    }

    /// Rebase the local commit onto the fetched remote tip, resolving
    /// conflicts in owned files with the local version.
    ///
    /// Edits outside the local commit are stashed for the rebase and put back
    /// afterwards. Returns the new base (the remote tip) on success. On failure
    /// the working tree is already restored.
    fn rebase_onto_remote(
        &self,
        branch: &str,
        owned: &OwnedPaths,
        request: &GitOperationRequest,
        base: Option<&str>,
    ) -> Result<String> {
        let tip = match self.fetch_tip(branch) {
            Ok(tip) => tip,
            Err(e) => {
                self.undo_commit(base);
                return Err(e);
            }
        };

        let identity = request.identity_args();
        let mut rebase_args: Vec<&str> = identity.iter().map(String::as_str).collect();
        rebase_args.extend(["rebase", "-q", "--autostash", tip.as_str()]);

        let run = match run_git_status(&self.repo_root, &rebase_args) {
            Ok(run) => run,
            Err(e) => return Err(self.abandon(branch, request, base, e.to_string())),
        };
        if run.success {
            debug!(target: LOG_TARGET, "rebased onto {}", tip);
            return Ok(tip);
        }

        let mut last_message = run.output.message().to_string();
        for _ in 0..MAX_CONFLICT_ROUNDS {
            let conflicted = match self.conflicted_files() {
                Ok(files) => files,
                Err(e) => return Err(self.abandon(branch, request, base, e.to_string())),
            };
            if conflicted.is_empty() {
                return Err(self.abandon(
                    branch,
                    request,
                    base,
                    format!("rebase onto {} failed: {}", tip, last_message),
                ));
            }

            let foreign: Vec<&str> = conflicted
                .iter()
                .map(String::as_str)
                .filter(|path| !owned.is_owned(path))
                .collect();
            if !foreign.is_empty() {
                return Err(self.abandon(
                    branch,
                    request,
                    base,
                    format!(
                        "rebase conflict in files not owned by this commit: {}",
                        foreign.join(", ")
                    ),
                ));
            }

            for path in &conflicted {
                if let Err(e) = self.take_local_version(path) {
                    return Err(self.abandon(branch, request, base, e.to_string()));
                }
            }
            info!(
                target: LOG_TARGET,
                "resolved {} conflict(s) with the local version: {}",
                conflicted.len(),
                conflicted.join(", ")
            );

            let mut continue_args: Vec<&str> = identity.iter().map(String::as_str).collect();
            continue_args.extend(["-c", "core.editor=true", "rebase", "--continue"]);
            let run = match run_git_status(&self.repo_root, &continue_args) {
                Ok(run) => run,
                Err(e) => return Err(self.abandon(branch, request, base, e.to_string())),
            };
            if run.success {
                debug!(target: LOG_TARGET, "rebased onto {}", tip);
                return Ok(tip);
            }
            last_message = run.output.message().to_string();
        }

        Err(self.abandon(
            branch,
            request,
            base,
            format!("rebase onto {} did not finish: {}", tip, last_message),
        ))
    }

    fn conflicted_files(&self) -> Result<Vec<String>> {
        let output = run_git(
            &self.repo_root,
            &["diff", "--name-only", "--diff-filter=U"],
        )?;
        Ok(output.lines().into_iter().map(str::to_string).collect())
    }

    /// During a rebase "theirs" is the commit being replayed, i.e. ours.
    fn take_local_version(&self, path: &str) -> Result<()> {
        let checkout = run_git_status(&self.repo_root, &["checkout", "--theirs", "--", path])?;
        if checkout.success {
            run_git(&self.repo_root, &["add", "--", path])?;
        } else {
            // The local commit deleted the file.
            run_git(&self.repo_root, &["rm", "-q", "--", path])?;
        }
        Ok(())
    }

    /// Give up on the local commit: abort any rebase and hard-reset to the
    /// remote tip (or the pre-commit state if the remote is unreachable).
    /// Working-tree edits the commit did not contain survive the reset.
    fn abandon(
        &self,
        branch: &str,
        request: &GitOperationRequest,
        base: Option<&str>,
        reason: String,
    ) -> PushlockError {
        self.abort_in_progress();

        let target = match self.fetch_tip(branch) {
            Ok(tip) => Some(tip),
            Err(e) => {
                warn!(target: LOG_TARGET, "{}; falling back to the pre-commit state", e);
                base.map(str::to_string)
            }
        };

        let reset = match target.as_deref() {
            Some(sha) => self.reset_keeping_edits(request, sha),
            None => self.clear_unborn_branch(),
        };
        match reset {
            Ok(()) => warn!(
                target: LOG_TARGET,
                "{}; reset {} to {}",
                reason,
                branch,
                target.as_deref().unwrap_or("an empty branch")
            ),
            Err(e) => warn!(target: LOG_TARGET, "{}; reset failed: {}", reason, e),
        }

        PushlockError::GitConflict(reason)
    }

    /// `reset --hard` to `sha`, then reapply uncommitted edits to tracked files.
    ///
    /// Edits that no longer apply cleanly are stored in the stash list instead.
    fn reset_keeping_edits(&self, request: &GitOperationRequest, sha: &str) -> Result<()> {
        let identity = request.identity_args();
        let mut stash_args: Vec<&str> = identity.iter().map(String::as_str).collect();
        stash_args.extend(["stash", "create", STASH_MESSAGE]);
        let stash = run_git(&self.repo_root, &stash_args)?.stdout;

        run_git(&self.repo_root, &["reset", "-q", "--hard", sha])?;
        if stash.is_empty() {
            return Ok(());
        }

        let apply = run_git_status(&self.repo_root, &["stash", "apply", "-q", &stash])?;
        if apply.success {
            debug!(target: LOG_TARGET, "reapplied uncommitted edits after reset");
            return Ok(());
        }

        run_git(&self.repo_root, &["reset", "-q", "--hard", sha])?;
        run_git(&self.repo_root, &["stash", "store", "-q", "-m", STASH_MESSAGE, &stash])?;
        warn!(
            target: LOG_TARGET,
            "uncommitted edits conflict with {}; saved to the stash as {}",
            sha,
            stash
        );
        Ok(())
    }

    /// Rewind the local commit, keeping its changes unstaged in the working tree.
    fn undo_commit(&self, base: Option<&str>) {
        let result = match base {
            Some(sha) => run_git(&self.repo_root, &["reset", "-q", "--mixed", sha]).map(|_| ()),
            None => self.clear_unborn_branch(),
        };
        match result {
            Ok(()) => info!(target: LOG_TARGET, "undid local commit; changes left uncommitted"),
            Err(e) => warn!(target: LOG_TARGET, "failed to undo local commit: {}", e),
        }
    }

    /// Return a branch whose first commit was never pushed to the unborn state.
    fn clear_unborn_branch(&self) -> Result<()> {
        run_git(&self.repo_root, &["update-ref", "-d", "HEAD"])?;
        run_git(&self.repo_root, &["reset", "-q"])?;
        Ok(())
    }

    /// Abort a rebase or merge left in progress. Best-effort.
    fn abort_in_progress(&self) {
        let git_dir = match git::get_git_dir(&self.repo_root) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(target: LOG_TARGET, "cannot locate git directory: {}", e);
                return;
            }
        };

        if git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists() {
            match run_git(&self.repo_root, &["rebase", "--abort"]) {
                Ok(_) => info!(target: LOG_TARGET, "aborted rebase in progress"),
                Err(e) => warn!(target: LOG_TARGET, "failed to abort rebase: {}", e),
            }
        }
        if git_dir.join("MERGE_HEAD").exists() {
            match run_git(&self.repo_root, &["merge", "--abort"]) {
                Ok(_) => info!(target: LOG_TARGET, "aborted merge in progress"),
                Err(e) => warn!(target: LOG_TARGET, "failed to abort merge: {}", e),
            }
        }
    }

    /// Bring a wedged working tree back to a committable state.
    ///
    /// Removes a leftover `index.lock`, aborts any rebase or merge, and
    /// unstages everything. HEAD stays where it is and working-tree edits
    /// are kept. Never fails; problems are logged.
    pub fn emergency_cleanup(&self) {
        warn!(target: LOG_TARGET, "emergency cleanup of {}", self.repo_root.display());

        match git::get_git_dir(&self.repo_root) {
            Ok(git_dir) => {
                let index_lock = git_dir.join("index.lock");
                if index_lock.exists() {
                    match fs::remove_file(&index_lock) {
                        Ok(()) => warn!(target: LOG_TARGET, "removed {}", index_lock.display()),
                        Err(e) => {
                            warn!(target: LOG_TARGET, "failed to remove {}: {}", index_lock.display(), e)
                        }
                    }
                }
            }
            Err(e) => warn!(target: LOG_TARGET, "cannot locate git directory: {}", e),
        }

        self.abort_in_progress();

        if let Err(e) = run_git(&self.repo_root, &["reset", "-q"]) {
            warn!(target: LOG_TARGET, "failed to unstage changes: {}", e);
        }
    }
}
