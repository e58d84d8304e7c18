use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A single repository on `main` with one commit and no remote.
pub(crate) fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path();

    init_repo(path);
    std::fs::write(path.join("README.md"), "# Test\n").unwrap();
    git(path, &["add", "."]);
    git(path, &["commit", "-m", "Initial commit"]);

    temp_dir
}

/// A bare `origin` seeded with one commit on `main`, plus independent clones
/// of it. Each clone stands in for one CI pipeline's checkout.
pub(crate) struct TestRemote {
    _root: TempDir,
    pub bare: PathBuf,
    pub clones: Vec<PathBuf>,
}

impl TestRemote {
    pub(crate) fn clone_path(&self, index: usize) -> &Path {
        &self.clones[index]
    }

    /// The SHA of `main` on the bare remote.
    pub(crate) fn remote_head(&self) -> String {
        git_output(&self.bare, &["rev-parse", "refs/heads/main"])
    }

    /// Content of a file at the tip of the remote's `main`.
    pub(crate) fn remote_file(&self, file: &str) -> String {
        git_output(&self.bare, &["show", &format!("main:{}", file)])
    }
}

pub(crate) fn create_test_remote(clone_count: usize) -> TestRemote {
    let root = TempDir::new().unwrap();
    let bare = root.path().join("origin.git");
    let seed = root.path().join("seed");
    std::fs::create_dir_all(&bare).unwrap();
    std::fs::create_dir_all(&seed).unwrap();

    git(&bare, &["init", "--bare"]);
    git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    init_repo(&seed);
    std::fs::write(seed.join("README.md"), "# Test\n").unwrap();
    std::fs::write(seed.join("shared.txt"), "base\n").unwrap();
    git(&seed, &["add", "."]);
    git(&seed, &["commit", "-m", "Initial commit"]);
    let bare_str = bare.to_string_lossy().to_string();
    git(&seed, &["remote", "add", "origin", &bare_str]);
    git(&seed, &["push", "origin", "main"]);

    let mut clones = Vec::new();
    for i in 0..clone_count {
        let clone = root.path().join(format!("clone{}", i));
        let clone_str = clone.to_string_lossy().to_string();
        git(root.path(), &["clone", "-q", &bare_str, &clone_str]);
        git(&clone, &["config", "user.email", "test@example.com"]);
        git(&clone, &["config", "user.name", "Test User"]);
        clones.push(clone);
    }

    TestRemote {
        _root: root,
        bare,
        clones,
    }
}

fn init_repo(path: &Path) {
    git(path, &["init"]);
    // Deterministic default branch name across environments.
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "user.name", "Test User"]);
}

/// Write a file, commit it and push it to `origin main` from the given clone,
/// bypassing pushlock entirely.
pub(crate) fn commit_and_push_directly(repo: &Path, file: &str, content: &str) {
    std::fs::write(repo.join(file), content).unwrap();
    git(repo, &["add", "--", file]);
    git(repo, &["commit", "-m", &format!("Update {}", file)]);
    git(repo, &["push", "origin", "main"]);
}

pub(crate) fn git_output(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub(crate) fn git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "git {} failed (exit code {:?})\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status.code(),
            stdout,
            stderr
        );
    }
}
