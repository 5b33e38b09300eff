// Git worktree operations module

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

pub mod error;

use crate::paths;
use error::{GitError, Result};

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
}

pub fn is_repo(path: &Path) -> bool {
    git2::Repository::discover(path).is_ok()
}

/// The branch checked out at `path`. Detached HEADs have no branch name and
/// cannot drive worktree selection.
pub fn current_branch(path: &Path) -> Result<String> {
    let repo =
        git2::Repository::discover(path).map_err(|_| GitError::NotARepo(path.to_path_buf()))?;
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(GitError::DetachedHead);
    }
    head.shorthand()
        .map(|s| s.to_string())
        .ok_or(GitError::DetachedHead)
}

/// Branch names become filesystem- and container-safe by replacing `/`, `:`
/// and spaces with dashes; nothing else is transformed.
pub fn sanitize_branch_name(name: &str) -> String {
    name.replace(['/', ':', ' '], "-")
}

/// Where a new worktree for this project and branch belongs:
/// `$XDG_DATA_HOME/corral/worktrees/<project>/<sanitized>`.
pub fn worktree_path_for(project_path: &Path, worktree_name: &str) -> Result<PathBuf> {
    let project = project_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    let dir = paths::worktrees_dir(&project).ok_or(GitError::NoDataDir)?;
    Ok(dir.join(sanitize_branch_name(worktree_name)))
}

fn worktree_list(repo_path: &Path) -> Result<Vec<WorktreeEntry>> {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(["worktree", "list", "--porcelain"])
        .output()?;
    if !output.status.success() {
        return Err(GitError::Worktree(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(parse_worktree_porcelain(&String::from_utf8_lossy(
        &output.stdout,
    )))
}

/// Parse `git worktree list --porcelain` output: blank-line separated blocks
/// of `worktree <path>`, `branch refs/heads/<name>` (or `detached`).
pub fn parse_worktree_porcelain(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;

    let mut flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>| {
        if let Some(p) = path.take() {
            entries.push(WorktreeEntry {
                path: p,
                branch: branch.take(),
            });
        }
        *branch = None;
    };

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            flush(&mut path, &mut branch);
        } else if let Some(p) = line.strip_prefix("worktree ") {
            flush(&mut path, &mut branch);
            path = Some(PathBuf::from(p));
        } else if let Some(b) = line.strip_prefix("branch ") {
            branch = Some(
                b.strip_prefix("refs/heads/")
                    .unwrap_or(b)
                    .to_string(),
            );
        }
    }
    flush(&mut path, &mut branch);
    entries
}

/// Whether a secondary worktree checked out on this branch already exists.
/// The first listing entry is the primary checkout and does not count: the
/// sandbox always gets its own worktree.
pub fn worktree_exists(repo_path: &Path, branch: &str) -> Result<bool> {
    Ok(worktree_list(repo_path)?
        .iter()
        .skip(1)
        .any(|e| e.branch.as_deref() == Some(branch)))
}

/// The recorded path of an existing secondary worktree for this branch, so
/// an invocation reuses it instead of creating a duplicate.
pub fn worktree_path_of(repo_path: &Path, branch: &str) -> Result<Option<PathBuf>> {
    Ok(worktree_list(repo_path)?
        .into_iter()
        .skip(1)
        .find(|e| e.branch.as_deref() == Some(branch))
        .map(|e| e.path))
}

pub fn branch_exists(repo_path: &Path, branch: &str) -> Result<bool> {
    let repo = git2::Repository::open(repo_path)?;
    let exists = repo.find_branch(branch, git2::BranchType::Local).is_ok();
    Ok(exists)
}

/// Create a worktree at `path`. Attaches to the branch when it already
/// exists locally, otherwise creates the branch as part of the add.
/// Attaching uses `--force`: the branch is usually checked out in the
/// primary working copy, and the sandbox mounts only the new worktree.
pub fn create_worktree(repo_path: &Path, path: &Path, branch: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut cmd = Command::new("git");
    cmd.current_dir(repo_path).args(["worktree", "add"]);
    if branch_exists(repo_path, branch)? {
        cmd.arg("--force").arg(path).arg(branch);
        debug!("+ git worktree add --force {} {}", path.display(), branch);
    } else {
        cmd.arg(path).arg("-b").arg(branch);
        debug!("+ git worktree add {} -b {}", path.display(), branch);
    }

    let output = cmd.output()?;
    if !output.status.success() {
        return Err(GitError::Worktree(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}

/// The main repository's `.git` directory at its symlink-resolved path.
/// Worktree checkouts carry a `.git` file pointing here; mounting it at the
/// same absolute path inside the container keeps that pointer valid.
pub fn main_repo_git_dir(work_dir: &Path) -> PathBuf {
    let real = work_dir
        .canonicalize()
        .unwrap_or_else(|_| work_dir.to_path_buf());
    real.join(".git")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

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

    fn git_available() -> bool {
        which::which("git").is_ok()
    }

    #[test]
    fn test_is_repo() {
        let (dir, _repo) = setup_test_repo();
        assert!(is_repo(dir.path()));

        let plain = TempDir::new().unwrap();
        assert!(!is_repo(plain.path()));
    }

    #[test]
    fn test_current_branch_of_fresh_repo() {
        let (dir, _repo) = setup_test_repo();
        let branch = current_branch(dir.path()).unwrap();
        assert!(branch == "main" || branch == "master");
    }

    #[test]
    fn test_sanitize_branch_name() {
        assert_eq!(sanitize_branch_name("feature/auth"), "feature-auth");
        assert_eq!(sanitize_branch_name("fix: thing"), "fix--thing");
        assert_eq!(sanitize_branch_name("plain"), "plain");
    }

    #[test]
    #[serial]
    fn test_worktree_path_for_uses_xdg_layout() {
        std::env::set_var("XDG_DATA_HOME", "/tmp/corral-git-test");
        let path =
            worktree_path_for(Path::new("/home/u/myproject"), "feature/auth").unwrap();
        assert_eq!(
            path,
            PathBuf::from("/tmp/corral-git-test/corral/worktrees/myproject/feature-auth")
        );
        std::env::remove_var("XDG_DATA_HOME");
    }

    #[test]
    fn test_parse_worktree_porcelain() {
        let output = "\
worktree /home/u/project
HEAD 1234567890abcdef
branch refs/heads/main

worktree /home/u/.local/share/corral/worktrees/project/feature-x
HEAD fedcba0987654321
branch refs/heads/feature/x

worktree /home/u/detached-wt
HEAD 1111111111111111
detached
";
        let entries = parse_worktree_porcelain(output);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert_eq!(entries[1].branch.as_deref(), Some("feature/x"));
        assert_eq!(
            entries[1].path,
            PathBuf::from("/home/u/.local/share/corral/worktrees/project/feature-x")
        );
        assert_eq!(entries[2].branch, None);
    }

    #[test]
    fn test_create_worktree_with_new_branch() {
        if !git_available() {
            return;
        }
        let (dir, repo) = setup_test_repo();
        let wt_path = dir.path().join("wt-new");
        create_worktree(dir.path(), &wt_path, "new-branch").unwrap();

        assert!(wt_path.exists());
        assert!(wt_path.join(".git").exists());
        assert!(repo
            .find_branch("new-branch", git2::BranchType::Local)
            .is_ok());
    }

    #[test]
    fn test_create_worktree_attaches_to_existing_branch() {
        if !git_available() {
            return;
        }
        let (dir, repo) = setup_test_repo();
        let head = repo.head().unwrap();
        let commit = head.peel_to_commit().unwrap();
        repo.branch("existing", &commit, false).unwrap();

        let wt_path = dir.path().join("wt-existing");
        create_worktree(dir.path(), &wt_path, "existing").unwrap();
        assert!(wt_path.exists());
        assert!(worktree_exists(dir.path(), "existing").unwrap());
    }

    #[test]
    fn test_worktree_path_of_finds_recorded_path() {
        if !git_available() {
            return;
        }
        let (dir, _repo) = setup_test_repo();
        let wt_path = dir.path().join("wt-lookup");
        create_worktree(dir.path(), &wt_path, "lookup-branch").unwrap();

        let found = worktree_path_of(dir.path(), "lookup-branch")
            .unwrap()
            .expect("worktree recorded");
        assert_eq!(
            found.file_name().unwrap().to_string_lossy(),
            "wt-lookup"
        );
        assert!(worktree_path_of(dir.path(), "absent").unwrap().is_none());
    }

    #[test]
    fn test_main_repo_git_dir_resolves_symlinks() {
        let (dir, _repo) = setup_test_repo();
        let link = dir.path().parent().unwrap().join(format!(
            "link-{}",
            dir.path().file_name().unwrap().to_string_lossy()
        ));
        if std::os::unix::fs::symlink(dir.path(), &link).is_ok() {
            let git_dir = main_repo_git_dir(&link);
            assert_eq!(git_dir, dir.path().canonicalize().unwrap().join(".git"));
            let _ = std::fs::remove_file(&link);
        }
    }
}
