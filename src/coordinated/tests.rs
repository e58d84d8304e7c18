//! Tests for the lock-guarded commit and push.

use super::*;
use crate::config::Config;
use crate::error::PushlockError;
use crate::test_support::{TestRemote, commit_and_push_directly, create_test_remote};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn ops_with_config(repo: &Path, config: Config) -> CoordinatedGitOperations {
    CoordinatedGitOperations::from_context(&RepoContext::from_root(repo.to_path_buf(), config))
}

fn ops_for(repo: &Path) -> CoordinatedGitOperations {
    ops_with_config(repo, Config::default())
}

fn request(message: &str, files: &[&str]) -> GitOperationRequest {
    GitOperationRequest::new(message, &Config::default())
        .with_files(files.iter().map(|f| f.to_string()).collect())
}

fn git_lock_file(repo: &Path) -> std::path::PathBuf {
    repo.join(".locks/git").join(format!("{}.lock", GIT_COMMIT_PUSH_WORKFLOW))
}

#[test]
fn test_coordinated_commit_push_without_contention() {
    let remote = create_test_remote(1);
    let repo = remote.clone_path(0);
    std::fs::write(repo.join("report.txt"), "done\n").unwrap();

    let result = ops_for(repo)
        .coordinated_commit_push(&request("Add report", &["report.txt"]))
        .unwrap();

    assert!(result.success);
    assert!(result.git.pushed);
    assert_eq!(result.coordination.waited_ms, 0);
    assert_eq!(result.coordination.lock.workflow_name, GIT_COMMIT_PUSH_WORKFLOW);
    assert!(!git_lock_file(repo).exists());
    assert_eq!(remote.remote_file("report.txt"), "done");
}

#[test]
fn test_nothing_to_commit_still_releases_lock() {
    let remote = create_test_remote(1);
    let repo = remote.clone_path(0);

    let result = ops_for(repo)
        .coordinated_commit_push(&request("Nothing", &["."]))
        .unwrap();

    assert!(result.success);
    assert!(!result.git.pushed);
    assert!(!result.git.commit_created);
    assert!(!git_lock_file(repo).exists());
}

#[test]
fn test_lock_released_when_push_fails() {
    let remote = create_test_remote(1);
    let repo = remote.clone_path(0);
    std::fs::write(repo.join("data.txt"), "payload\n").unwrap();

    let config = Config {
        remote: "no-such-remote".to_string(),
        ..Config::default()
    };
    let ops = ops_with_config(repo, config);
    let err = ops
        .coordinated_commit_push(&request("Add data", &["data.txt"]))
        .unwrap_err();

    assert!(matches!(err, PushlockError::GitError(_)));
    assert!(!git_lock_file(repo).exists());

    let again = ops
        .coordinator()
        .coordinate_workflow(GIT_COMMIT_PUSH_WORKFLOW)
        .unwrap();
    assert_eq!(again.waited_ms, 0);
}

#[test]
fn test_held_lock_times_out_without_touching_tree() {
    let remote = create_test_remote(1);
    let repo = remote.clone_path(0);
    std::fs::write(repo.join("data.txt"), "payload\n").unwrap();
    let before = remote.remote_head();

    let config = Config {
        lock_max_wait_secs: 0,
        ..Config::default()
    };
    let ops = ops_with_config(repo, config);
    let held = ops
        .coordinator()
        .coordinate_workflow(GIT_COMMIT_PUSH_WORKFLOW)
        .unwrap();

    let err = ops
        .coordinated_commit_push(&request("Add data", &["data.txt"]))
        .unwrap_err();

    match err {
        PushlockError::LockTimeout { holder, .. } => assert_eq!(holder, held.lock.lock_id),
        other => panic!("expected LockTimeout, got {:?}", other),
    }
    assert!(git_lock_file(repo).exists());
    assert!(ops.git().has_changes().unwrap());
    assert!(!ops.git().has_staged_changes().unwrap());
    assert_eq!(remote.remote_head(), before);
}

#[test]
fn test_emergency_push_clears_held_lock() {
    let remote = create_test_remote(1);
    let repo = remote.clone_path(0);
    std::fs::write(repo.join("hotfix.txt"), "fix\n").unwrap();

    let ops = ops_for(repo);
    ops.coordinator()
        .coordinate_workflow(GIT_COMMIT_PUSH_WORKFLOW)
        .unwrap();
    assert!(git_lock_file(repo).exists());

    let result = ops
        .emergency_commit_push(&request("Hotfix", &["hotfix.txt"]))
        .unwrap();

    assert!(result.success);
    assert!(result.emergency);
    assert!(result.git.pushed);
    assert_eq!(result.cleared_locks, 1);
    assert!(!git_lock_file(repo).exists());
    assert_eq!(remote.remote_file("hotfix.txt"), "fix");

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["emergency"], true);
    assert_eq!(json["clearedLocks"], 1);
}

#[test]
fn test_emergency_push_recovers_from_index_lock() {
    let remote = create_test_remote(1);
    let repo = remote.clone_path(0);
    std::fs::write(repo.join("hotfix.txt"), "fix\n").unwrap();
    let index_lock = crate::git::get_git_dir(repo).unwrap().join("index.lock");
    std::fs::write(&index_lock, "").unwrap();

    let result = ops_for(repo)
        .emergency_commit_push(&request("Hotfix", &["hotfix.txt"]))
        .unwrap();

    assert!(result.git.pushed);
    assert_eq!(result.cleared_locks, 0);
    assert!(!index_lock.exists());
}

#[test]
fn test_status_reports_tree_and_locks() {
    let remote = create_test_remote(1);
    let repo = remote.clone_path(0);
    let ops = ops_for(repo);

    let status = ops.get_status().unwrap();
    assert!(!status.git.has_changes);
    assert_eq!(status.git.current_branch, "main");
    assert_eq!(status.coordination.total_active_workflows, 0);
    assert!(!status.ready_for_operation);

    std::fs::write(repo.join("new.txt"), "x\n").unwrap();
    let status = ops.get_status().unwrap();
    assert!(status.git.has_changes);
    assert!(status.ready_for_operation);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["readyForOperation"], true);
    assert_eq!(json["git"]["hasChanges"], true);
    assert_eq!(json["git"]["currentBranch"], "main");
    assert_eq!(json["coordination"]["totalActiveWorkflows"], 0);
}

#[test]
fn test_lock_markers_never_show_as_changes() {
    let remote = create_test_remote(1);
    let repo = remote.clone_path(0);
    let ops = ops_for(repo);

    ops.coordinator()
        .coordinate_workflow(GIT_COMMIT_PUSH_WORKFLOW)
        .unwrap();
    ops.coordinator().coordinate_workflow("nightly-report").unwrap();

    let status = ops.get_status().unwrap();
    assert!(!status.git.has_changes);
    assert_eq!(status.coordination.total_active_workflows, 2);
    assert!(!status.ready_for_operation);
}

#[test]
fn test_concurrent_pipelines_both_land() {
    let remote: TestRemote = create_test_remote(3);
    let shared_locks = TempDir::new().unwrap();
    // A push from outside the lock so both pipelines start behind.
    commit_and_push_directly(remote.clone_path(2), "outside.txt", "outside\n");

    let options = CoordinationOptions {
        ttl: Duration::from_secs(600),
        max_wait: Duration::from_secs(60),
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(200),
    };
    let pipelines: Vec<CoordinatedGitOperations> = (0..2)
        .map(|i| {
            let store = FsLockStore::new(
                shared_locks.path().join("git"),
                shared_locks.path().join("workflows"),
            );
            CoordinatedGitOperations::new(
                WorkflowCoordinator::new(store, options.clone()),
                SafeGitOperations::new(remote.clone_path(i), GitOptions::default()),
            )
        })
        .collect();

    for (i, pipeline) in pipelines.iter().enumerate() {
        let file = format!("pipeline{}.txt", i);
        std::fs::write(pipeline.git().repo_root().join(&file), format!("{}\n", i)).unwrap();
    }

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = pipelines
            .iter()
            .enumerate()
            .map(|(i, pipeline)| {
                s.spawn(move || {
                    let file = format!("pipeline{}.txt", i);
                    pipeline.coordinated_commit_push(&request("Pipeline output", &[file.as_str()]))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in results {
        let result = result.unwrap();
        assert!(result.success);
        assert!(result.git.pushed);
    }
    assert_eq!(remote.remote_file("pipeline0.txt"), "0");
    assert_eq!(remote.remote_file("pipeline1.txt"), "1");
    assert_eq!(remote.remote_file("outside.txt"), "outside");
}
