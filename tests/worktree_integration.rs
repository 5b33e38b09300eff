//! Worktree resolution against real git repositories.

use std::path::Path;
use std::process::Command;

use serial_test::serial;
use tempfile::TempDir;

use corral::runner::{resolve_worktree, NO_WORKTREE};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn setup_test_repo() -> (TempDir, git2::Repository) {
    let dir = TempDir::new().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    let sig = git2::Signature::now("Test", "test@example.com").unwrap();
    let tree_id = {
        let mut index = repo.index().unwrap();
        index.write_tree().unwrap()
    };
    {
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();
    }

    (dir, repo)
}

fn checked_out_branch(path: &Path) -> String {
    let repo = git2::Repository::open(path).unwrap();
    let name = repo.head().unwrap().shorthand().unwrap().to_string();
    name
}

#[test]
#[serial]
fn cold_run_creates_worktree_under_data_dir() {
    if !git_available() {
        return;
    }
    let data = TempDir::new().unwrap();
    std::env::set_var("XDG_DATA_HOME", data.path());

    let (dir, _repo) = setup_test_repo();
    let ctx = resolve_worktree(dir.path(), Some("feature/x"), false).unwrap();

    assert_eq!(ctx.name, "feature/x");
    let project = dir.path().file_name().unwrap().to_string_lossy().to_string();
    let expected = data
        .path()
        .join("corral/worktrees")
        .join(&project)
        .join("feature-x");
    assert_eq!(ctx.mount_path, expected);
    assert!(ctx.mount_path.join(".git").exists());
    assert_eq!(checked_out_branch(&ctx.mount_path), "feature/x");

    let git_dir = ctx.main_repo_git_dir.expect("main repo git dir recorded");
    assert_eq!(git_dir, dir.path().canonicalize().unwrap().join(".git"));

    std::env::remove_var("XDG_DATA_HOME");
}

#[test]
#[serial]
fn second_run_reuses_the_existing_worktree() {
    if !git_available() {
        return;
    }
    let data = TempDir::new().unwrap();
    std::env::set_var("XDG_DATA_HOME", data.path());

    let (dir, _repo) = setup_test_repo();
    let first = resolve_worktree(dir.path(), Some("feature/y"), false).unwrap();
    let second = resolve_worktree(dir.path(), Some("feature/y"), false).unwrap();
    assert_eq!(first.mount_path, second.mount_path);

    std::env::remove_var("XDG_DATA_HOME");
}

#[test]
#[serial]
fn current_branch_drives_worktree_name() {
    if !git_available() {
        return;
    }
    let data = TempDir::new().unwrap();
    std::env::set_var("XDG_DATA_HOME", data.path());

    let (dir, _repo) = setup_test_repo();
    let branch = checked_out_branch(dir.path());
    let ctx = resolve_worktree(dir.path(), None, false).unwrap();
    assert_eq!(ctx.name, branch);
    assert_eq!(checked_out_branch(&ctx.mount_path), branch);

    std::env::remove_var("XDG_DATA_HOME");
}

#[test]
fn plain_directory_runs_without_worktree() {
    let dir = TempDir::new().unwrap();
    let ctx = resolve_worktree(dir.path(), None, false).unwrap();
    assert_eq!(ctx.name, NO_WORKTREE);
    assert_eq!(ctx.mount_path, dir.path());
    assert!(ctx.main_repo_git_dir.is_none());
}

#[test]
fn no_worktree_flag_skips_git_entirely() {
    let (dir, _repo) = setup_test_repo();
    let ctx = resolve_worktree(dir.path(), None, true).unwrap();
    assert_eq!(ctx.name, NO_WORKTREE);
    assert_eq!(ctx.mount_path, dir.path());
}

#[test]
fn worktree_flag_outside_repo_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(resolve_worktree(dir.path(), Some("feature"), false).is_err());
}
