//! Git error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from running git against a working copy
#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {operation} failed in {repo}: {stderr}")]
    CommandFailed {
        repo: PathBuf,
        operation: String,
        stderr: String,
    },

    #[error("git {operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Working tree at {0} has uncommitted changes")]
    DirtyTree(PathBuf),

    #[error("Unexpected output from git {operation}: {output}")]
    UnexpectedOutput { operation: String, output: String },
}

impl GitError {
    pub fn command_failed(repo: impl Into<PathBuf>, operation: impl Into<String>, stderr: impl Into<String>) -> Self {
        GitError::CommandFailed {
            repo: repo.into(),
            operation: operation.into(),
            stderr: stderr.into(),
        }
    }
}
