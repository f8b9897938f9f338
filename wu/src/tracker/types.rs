//! Tracker data types

use serde::{Deserialize, Serialize};

/// An issue as reported by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    /// "open" or "closed"
    pub state: String,
    #[serde(rename = "html_url")]
    pub url: String,
    pub title: String,
}

/// Head of a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub branch: String,
}

/// A pull request as reported by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub state: String,
    #[serde(default)]
    pub merged_at: Option<String>,
    #[serde(rename = "html_url")]
    pub url: String,
    pub head: PullRequestHead,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }
}

/// Repository metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub private: bool,
    pub default_branch: String,
}

/// Filter for listing pull requests in any state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestQuery {
    pub head: String,
}

impl PullRequestQuery {
    pub fn head(head: impl Into<String>) -> Self {
        Self { head: head.into() }
    }
}
