//! TrackerFacade trait

use async_trait::async_trait;

use super::{Issue, PullRequest, PullRequestQuery, RepoInfo, TrackerError};

/// Read access to issues, pull requests and repositories, plus fork creation
#[async_trait]
pub trait TrackerFacade: Send + Sync {
    async fn get_issue(&self, owner: &str, project: &str, number: u64) -> Result<Issue, TrackerError>;

    /// All pull requests matching `query`, across every page
    async fn list_pull_requests(
        &self,
        owner: &str,
        project: &str,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequest>, TrackerError>;

    async fn get_repo(&self, owner: &str, project: &str) -> Result<RepoInfo, TrackerError>;

    /// Whether `branch` exists on the host; a 404 is `false`, not an error
    async fn branch_exists(&self, owner: &str, project: &str, branch: &str) -> Result<bool, TrackerError>;

    /// Login of the authenticated user
    async fn current_login(&self) -> Result<String, TrackerError>;

    /// Fork `owner/project` into the authenticated user's account
    async fn create_fork(&self, owner: &str, project: &str) -> Result<(), TrackerError>;
}
