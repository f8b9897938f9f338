//! Status report types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::git::SyncStatus;

/// Existence and sync state of the work branch in one project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkBranchStatus {
    pub local_branch_found: bool,
    pub remote_branch_found: bool,
    /// Present only when both branches exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub local_branch_removed: bool,
}

/// Whether a branch's changes have reached local and remote main
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStatus {
    pub merged_to_local_main: bool,
    pub merged_to_remote_main: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub state: String,
    pub merged: bool,
    pub url: String,
}

/// Reconciled state of one project
///
/// Fields are filled in as reconciliation proceeds; when a step fails,
/// `error` is set and whatever was gathered before the failure remains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub work_branch: WorkBranchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_changes: Option<MergeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_changes: Option<MergeStatus>,
    #[serde(default)]
    pub pull_requests: Vec<PullRequestSummary>,
    #[serde(rename = "totalPRs", default)]
    pub total_prs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectStatus {
    pub fn has_merged_pull_request(&self) -> bool {
        self.pull_requests.iter().any(|pr| pr.merged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
    /// The lookup failed
    Unknown,
}

impl IssueState {
    pub fn from_tracker(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "open" => IssueState::Open,
            "closed" => IssueState::Closed,
            _ => IssueState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub number: u64,
    pub state: IssueState,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reconciled state of a whole unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Keyed by `<org>/<project>/<number>`
    pub issues: BTreeMap<String, IssueStatus>,
    /// Keyed by `<org>/<project>`
    pub projects: BTreeMap<String, ProjectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_closed: Option<bool>,
}

/// Options controlling status reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusOptions {
    /// Skip fetching from remotes
    pub no_fetch: bool,
    /// Merge upstream changes into local main and the local work branch
    pub update_local: bool,
    /// Report every pull request, not just open or merged ones
    pub all_pulls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_status_json_shape() {
        let status = ProjectStatus {
            work_branch: WorkBranchStatus {
                local_branch_found: true,
                remote_branch_found: true,
                sync_status: Some(SyncStatus::LocalAhead),
                local_branch_removed: false,
            },
            local_changes: Some(MergeStatus {
                merged_to_local_main: false,
                merged_to_remote_main: true,
            }),
            remote_changes: None,
            pull_requests: vec![],
            total_prs: 2,
            error: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["workBranch"]["syncStatus"], "local ahead");
        assert_eq!(json["localChanges"]["mergedToRemoteMain"], true);
        assert_eq!(json["totalPRs"], 2);
        assert!(json.get("remoteChanges").is_none());
        assert!(json["workBranch"].get("localBranchRemoved").is_none());
    }

    #[test]
    fn test_issue_state_from_tracker() {
        assert_eq!(IssueState::from_tracker("closed"), IssueState::Closed);
        assert_eq!(IssueState::from_tracker("OPEN"), IssueState::Open);
        assert_eq!(IssueState::from_tracker("weird"), IssueState::Unknown);
    }
}
