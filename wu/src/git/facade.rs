//! GitFacade trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::GitError;

/// How a local branch relates to its remote counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    #[serde(rename = "in sync")]
    InSync,
    #[serde(rename = "local ahead")]
    LocalAhead,
    #[serde(rename = "remote ahead")]
    RemoteAhead,
    #[serde(rename = "diverged")]
    Diverged,
}

impl SyncStatus {
    /// Classify from commit counts unique to each side
    pub fn from_counts(local_only: usize, remote_only: usize) -> Self {
        match (local_only, remote_only) {
            (0, 0) => SyncStatus::InSync,
            (_, 0) => SyncStatus::LocalAhead,
            (0, _) => SyncStatus::RemoteAhead,
            _ => SyncStatus::Diverged,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::InSync => "in sync",
            SyncStatus::LocalAhead => "local ahead",
            SyncStatus::RemoteAhead => "remote ahead",
            SyncStatus::Diverged => "diverged",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What HEAD points at in a working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Branch(String),
    /// Detached at the given commit id
    Detached(String),
}

impl Head {
    /// Branch name, or the commit id when detached
    pub fn name(&self) -> &str {
        match self {
            Head::Branch(name) | Head::Detached(name) => name,
        }
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Head::Branch(name) => f.write_str(name),
            Head::Detached(commit) => write!(f, "detached HEAD {}", commit),
        }
    }
}

/// Git operations against one working copy
///
/// Every method takes the repository path; implementations hold no
/// per-repository state between calls. Branch arguments are short names
/// (`main`, `work-acme/widgets/42`); remote branches are addressed by
/// `(remote, branch)`.
#[async_trait]
pub trait GitFacade: Send + Sync {
    /// Name of the primary remote and the main branch
    async fn origin_and_main(&self, repo: &Path) -> Result<(String, String), GitError>;

    async fn head(&self, repo: &Path) -> Result<Head, GitError>;

    /// Current branch name; a detached HEAD yields its commit id
    async fn current_branch(&self, repo: &Path) -> Result<String, GitError> {
        Ok(self.head(repo).await?.name().to_string())
    }

    async fn has_local_branch(&self, repo: &Path, branch: &str) -> Result<bool, GitError>;

    /// Whether the remote-tracking ref `<remote>/<branch>` exists locally
    async fn has_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> Result<bool, GitError>;

    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), GitError>;

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    /// Detach HEAD at `commit`
    async fn checkout_detached(&self, repo: &Path, commit: &str) -> Result<(), GitError>;

    /// Create `branch` from the current HEAD and switch to it
    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError>;

    /// Fetch `<remote>/<branch>` and create a local branch tracking it
    async fn track_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), GitError>;

    /// Merge `source` (any ref) into the current branch
    async fn merge(&self, repo: &Path, source: &str) -> Result<(), GitError>;

    async fn push_set_upstream(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), GitError>;

    async fn is_clean(&self, repo: &Path) -> Result<bool, GitError>;

    /// Whether the tip of `commit` is reachable from `target`
    async fn contains(&self, repo: &Path, commit: &str, target: &str) -> Result<bool, GitError>;

    /// Compare local `branch` with `<remote>/<branch>`
    async fn compare(&self, repo: &Path, branch: &str, remote: &str) -> Result<SyncStatus, GitError>;

    async fn delete_branch(&self, repo: &Path, branch: &str, force: bool) -> Result<(), GitError>;

    /// URL of `remote`, or `None` if no such remote is configured
    async fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>, GitError>;

    async fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> Result<(), GitError>;

    /// Configured `user.email`, read relative to `repo` when given
    async fn author_email(&self, repo: Option<&Path>) -> Result<String, GitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_from_counts() {
        assert_eq!(SyncStatus::from_counts(0, 0), SyncStatus::InSync);
        assert_eq!(SyncStatus::from_counts(2, 0), SyncStatus::LocalAhead);
        assert_eq!(SyncStatus::from_counts(0, 1), SyncStatus::RemoteAhead);
        assert_eq!(SyncStatus::from_counts(3, 4), SyncStatus::Diverged);
    }

    #[test]
    fn test_sync_status_serializes_as_phrase() {
        let json = serde_json::to_string(&SyncStatus::LocalAhead).unwrap();
        assert_eq!(json, "\"local ahead\"");
        let back: SyncStatus = serde_json::from_str("\"remote ahead\"").unwrap();
        assert_eq!(back, SyncStatus::RemoteAhead);
        assert_eq!(SyncStatus::Diverged.to_string(), "diverged");
    }

    #[test]
    fn test_head_name_and_display() {
        let branch = Head::Branch("main".to_string());
        assert_eq!(branch.name(), "main");
        assert_eq!(branch.to_string(), "main");

        let detached = Head::Detached("0123abcd".to_string());
        assert_eq!(detached.name(), "0123abcd");
        assert_eq!(detached.to_string(), "detached HEAD 0123abcd");
    }
}
