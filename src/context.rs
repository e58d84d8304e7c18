//! Repository context resolution for pushlock.
//!
//! Finds the Git repository root from any working directory, loads the
//! configuration, and resolves the absolute lock directory paths. Every
//! command builds its components from a `RepoContext` so that all callers on
//! the same checkout agree on where lock markers live.

use crate::config::{CONFIG_FILE_NAME, Config};
use crate::error::{PushlockError, Result};
use crate::git;
use std::env;
use std::path::{Path, PathBuf};

/// Resolved paths and configuration for one repository checkout.
#[derive(Debug, Clone)]
pub struct RepoContext {
    /// Absolute path to the repository root (the working tree top level).
    pub repo_root: PathBuf,

    /// Absolute path to the git-operation locks directory.
    pub git_locks_dir: PathBuf,

    /// Absolute path to the general workflow locks directory.
    pub workflow_locks_dir: PathBuf,

    /// Effective configuration.
    pub config: Config,
}

impl RepoContext {
    /// Resolve the context from `repo` (or the current working directory).
    ///
    /// `config_path` overrides the default `.pushlock.yaml` at the repo root;
    /// an explicitly given file must exist.
    pub fn resolve(repo: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        let cwd = match repo {
            Some(path) => path.to_path_buf(),
            None => env::current_dir().map_err(|e| {
                PushlockError::UserError(format!("failed to get current working directory: {}", e))
            })?,
        };

        Self::resolve_from(&cwd, config_path)
    }

    /// Resolve the context from a specific directory inside the repository.
    pub fn resolve_from<P: AsRef<Path>>(cwd: P, config_path: Option<&Path>) -> Result<Self> {
        let repo_root = git::get_repo_root(cwd.as_ref())?;

        let config = match config_path {
            Some(path) => Config::load(path)?,
            None => Config::load_or_default(repo_root.join(CONFIG_FILE_NAME))?,
        };

        Ok(Self::from_root(repo_root, config))
    }

    /// Build a context for a known repository root and configuration.
    pub fn from_root(repo_root: PathBuf, config: Config) -> Self {
        let git_locks_dir = repo_root.join(&config.git_locks_dir);
        let workflow_locks_dir = repo_root.join(&config.workflow_locks_dir);

        Self {
            repo_root,
            git_locks_dir,
            workflow_locks_dir,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_test_repo;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_from_root_uses_default_dirs() {
        let temp_dir = create_test_repo();
        let ctx = RepoContext::resolve_from(temp_dir.path(), None).unwrap();

        let root = temp_dir.path().canonicalize().unwrap();
        assert_eq!(ctx.repo_root.canonicalize().unwrap(), root);
        assert!(ctx.git_locks_dir.ends_with(".locks/git"));
        assert!(ctx.workflow_locks_dir.ends_with(".locks/workflows"));
        assert!(ctx.git_locks_dir.starts_with(&ctx.repo_root));
    }

    #[test]
    fn test_resolve_from_subdirectory_finds_root() {
        let temp_dir = create_test_repo();
        let subdir = temp_dir.path().join("a").join("b");
        std::fs::create_dir_all(&subdir).unwrap();

        let ctx = RepoContext::resolve_from(&subdir, None).unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        assert_eq!(ctx.repo_root.canonicalize().unwrap(), root);
    }

    #[test]
    fn test_resolve_reads_repo_config_file() {
        let temp_dir = create_test_repo();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "git_locks_dir: ci/git-locks\nremote: upstream\n",
        )
        .unwrap();

        let ctx = RepoContext::resolve_from(temp_dir.path(), None).unwrap();
        assert_eq!(ctx.config.remote, "upstream");
        assert!(ctx.git_locks_dir.ends_with("ci/git-locks"));
    }

    #[test]
    fn test_resolve_with_missing_explicit_config_fails() {
        let temp_dir = create_test_repo();
        let missing = temp_dir.path().join("nope.yaml");
        let result = RepoContext::resolve_from(temp_dir.path(), Some(&missing));
        assert!(matches!(result, Err(PushlockError::UserError(_))));
    }

    #[test]
    fn test_resolve_outside_repo_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = RepoContext::resolve_from(temp_dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("not inside a git repository"));
    }
}
