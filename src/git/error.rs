use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("HEAD is detached; use --worktree to name a branch")]
    DetachedHead,

    #[error("worktree operation failed: {0}")]
    Worktree(String),

    #[error("could not determine data directory for worktrees")]
    NoDataDir,

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;
