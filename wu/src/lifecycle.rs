//! Lifecycle decisions: closing units of work and deleting their branches

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use workstore::{WorkStore, WorkUnit};

use crate::error::WorkError;
use crate::git::SyncStatus;
use crate::reconcile::BranchReconciler;
use crate::report::{IssueState, ProjectStatus, StatusOptions, StatusReport};
use crate::status::StatusAggregator;
use crate::tasklog::TaskLog;

/// Why a unit of work cannot be closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum CloseBlocker {
    OpenIssues { issues: Vec<String> },
    NoMergedPullRequest { project: String },
    LocalAhead { project: String },
    Unreconciled { project: String, error: String },
}

impl fmt::Display for CloseBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseBlocker::OpenIssues { issues } => write!(f, "issues not closed: {}", issues.join(", ")),
            CloseBlocker::NoMergedPullRequest { project } => write!(f, "no evidence of a merged PR in {}", project),
            CloseBlocker::LocalAhead { project } => write!(f, "un-merged local work branch changes in {}", project),
            CloseBlocker::Unreconciled { project, error } => {
                write!(f, "status of {} could not be determined: {}", project, error)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Closability {
    pub closable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<CloseBlocker>,
}

impl Closability {
    fn closable() -> Self {
        Self {
            closable: true,
            blocker: None,
        }
    }

    fn blocked(blocker: CloseBlocker) -> Self {
        Self {
            closable: false,
            blocker: Some(blocker),
        }
    }
}

/// Linked issues whose reported state is anything but closed
pub fn open_issues(unit: &WorkUnit, report: &StatusReport) -> Vec<String> {
    unit.issue_ids()
        .map(|id| id.to_string())
        .filter(|id| report.issues.get(id).is_none_or(|status| status.state != IssueState::Closed))
        .collect()
}

/// Decide whether `unit` may be closed given `report`
///
/// Requires every linked issue closed. Projects are then checked in declared
/// order; the first one without a merged pull request, with local work ahead
/// of its remote, or without a usable status stops the evaluation.
pub fn evaluate_closable(unit: &WorkUnit, report: &StatusReport) -> Closability {
    let open = open_issues(unit, report);
    if !open.is_empty() {
        return Closability::blocked(CloseBlocker::OpenIssues { issues: open });
    }

    for name in unit.project_names() {
        let project = name.to_string();
        let Some(status) = report.projects.get(&project) else {
            return Closability::blocked(CloseBlocker::Unreconciled {
                project,
                error: "missing from status report".to_string(),
            });
        };
        if let Some(error) = &status.error {
            return Closability::blocked(CloseBlocker::Unreconciled {
                project,
                error: error.clone(),
            });
        }
        if !status.has_merged_pull_request() {
            return Closability::blocked(CloseBlocker::NoMergedPullRequest { project });
        }
        if status.work_branch.sync_status == Some(SyncStatus::LocalAhead) {
            return Closability::blocked(CloseBlocker::LocalAhead { project });
        }
    }
    Closability::closable()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotFound,
    NotMerged,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => f.write_str("not found"),
            SkipReason::NotMerged => f.write_str("not merged"),
        }
    }
}

/// Why the local work branch of a project must be kept, if it must
pub fn deletion_skip_reason(status: &ProjectStatus) -> Option<SkipReason> {
    if !status.work_branch.local_branch_found {
        return Some(SkipReason::NotFound);
    }
    match status.local_changes {
        Some(changes) if changes.merged_to_remote_main => None,
        _ => Some(SkipReason::NotMerged),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum BranchDeletion {
    Removed,
    Skipped { reason: SkipReason },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDeletion {
    pub project: String,
    #[serde(flatten)]
    pub outcome: BranchDeletion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanOptions {
    pub no_fetch: bool,
    pub no_update_local: bool,
    pub no_delete_branches: bool,
    pub no_close: bool,
}

/// Everything a clean or close did to one unit of work
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanOutcome {
    pub key: String,
    pub report: StatusReport,
    pub branch_deletions: Vec<ProjectDeletion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closability: Option<Closability>,
    pub closed: bool,
}

/// One key's result within a clean over every open unit
#[derive(Debug, Serialize)]
pub struct CleanAllEntry {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CleanOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct LifecycleController {
    aggregator: Arc<StatusAggregator>,
    reconciler: Arc<BranchReconciler>,
}

impl LifecycleController {
    pub fn new(aggregator: Arc<StatusAggregator>, reconciler: Arc<BranchReconciler>) -> Self {
        Self { aggregator, reconciler }
    }

    /// Delete local work branches that are confirmed merged, when no linked issue is open
    ///
    /// Marks `localBranchRemoved` in `report` for every deleted branch.
    pub async fn delete_branches(
        &self,
        unit: &WorkUnit,
        report: &mut StatusReport,
        log: &mut TaskLog,
    ) -> Vec<ProjectDeletion> {
        debug!(key = %unit.key, "LifecycleController::delete_branches: called");
        let open = open_issues(unit, report);
        if !open.is_empty() {
            log.info(format!(
                "Not deleting work branches; issues still open: {}",
                open.join(", ")
            ));
            return Vec::new();
        }

        let mut deletions = Vec::new();
        for name in unit.project_names() {
            let project = name.to_string();
            log.info(format!("Considering deleting work branch in project {}...", project));
            let Some(status) = report.projects.get_mut(&project) else {
                continue;
            };

            let outcome = match deletion_skip_reason(status) {
                Some(reason) => {
                    log.info(format!("  skipping; local work branch {}.", reason));
                    BranchDeletion::Skipped { reason }
                }
                None => match self.reconciler.delete_work_branch(name, &unit.key, log).await {
                    Ok(()) => {
                        status.work_branch.local_branch_removed = true;
                        BranchDeletion::Removed
                    }
                    Err(e) => {
                        log.error(format!("Failed to delete work branch in {}: {}", project, e));
                        BranchDeletion::Failed { error: e.to_string() }
                    }
                },
            };
            deletions.push(ProjectDeletion { project, outcome });
        }
        deletions
    }

    /// Reconcile, delete merged branches, and close the unit if policy allows
    pub async fn clean(
        &self,
        store: &mut WorkStore,
        key: &str,
        options: &CleanOptions,
        log: &mut TaskLog,
    ) -> Result<CleanOutcome, WorkError> {
        debug!(%key, ?options, "LifecycleController::clean: called");
        let unit = store.require(key)?;

        let status_options = StatusOptions {
            no_fetch: options.no_fetch,
            update_local: !options.no_update_local,
            all_pulls: false,
        };
        let mut report = self.aggregator.reconcile(&unit, &status_options, log).await;

        let branch_deletions = if options.no_delete_branches {
            Vec::new()
        } else {
            self.delete_branches(&unit, &mut report, log).await
        };

        let mut closed = false;
        let closability = if options.no_close {
            None
        } else {
            let decision = evaluate_closable(&unit, &report);
            match &decision.blocker {
                None => {
                    store.close(key)?;
                    closed = true;
                    info!(%key, "Closed unit of work after clean");
                    log.info(format!("Closed {}.", key));
                }
                Some(blocker) => {
                    log.info(format!("Unable to close {}: {}.", key, blocker));
                }
            }
            report.is_closed = Some(closed);
            Some(decision)
        };

        Ok(CleanOutcome {
            key: key.to_string(),
            report,
            branch_deletions,
            closability,
            closed,
        })
    }

    /// Clean every open unit; a failure on one key does not stop the rest
    pub async fn clean_all(
        &self,
        store: &mut WorkStore,
        options: &CleanOptions,
        log: &mut TaskLog,
    ) -> Vec<CleanAllEntry> {
        debug!(?options, "LifecycleController::clean_all: called");
        let mut entries = Vec::new();
        for key in store.keys() {
            match self.clean(store, &key, options, log).await {
                Ok(outcome) => entries.push(CleanAllEntry {
                    key,
                    outcome: Some(outcome),
                    error: None,
                }),
                Err(e) => {
                    log.error(format!("Failed to clean {}: {}", key, e));
                    entries.push(CleanAllEntry {
                        key,
                        outcome: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        entries
    }

    /// Close the unit regardless of policy, deleting branches where it is safe
    ///
    /// The closable decision is still evaluated and reported.
    pub async fn close(&self, store: &mut WorkStore, key: &str, log: &mut TaskLog) -> Result<CleanOutcome, WorkError> {
        debug!(%key, "LifecycleController::close: called");
        let unit = store.require(key)?;

        let status_options = StatusOptions {
            no_fetch: true,
            update_local: false,
            all_pulls: false,
        };
        let mut report = self.aggregator.reconcile(&unit, &status_options, log).await;
        let branch_deletions = self.delete_branches(&unit, &mut report, log).await;

        let decision = evaluate_closable(&unit, &report);
        if let Some(blocker) = &decision.blocker {
            log.warn(format!("Closing {} although it would not be closable: {}.", key, blocker));
        }
        store.close(key)?;
        report.is_closed = Some(true);
        log.info(format!("Closed {}.", key));

        Ok(CleanOutcome {
            key: key.to_string(),
            report,
            branch_deletions,
            closability: Some(decision),
            closed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{IssueStatus, MergeStatus, PullRequestSummary, WorkBranchStatus};
    use chrono::Utc;
    use workstore::{IssueEntry, IssueRef, ProjectEntry, ProjectRef};

    fn unit(projects: &[&str]) -> WorkUnit {
        let mut unit = WorkUnit::new("work-acme/widgets/42", "Fix", "dev@acme.io", Utc::now());
        unit.issues.push(IssueEntry {
            id: IssueRef::new("acme", "widgets", 42),
            summary: "Fix".to_string(),
        });
        for p in projects {
            unit.projects.push(ProjectEntry {
                name: ProjectRef::parse(p).unwrap(),
                private: true,
            });
        }
        unit
    }

    fn issue(state: IssueState) -> IssueStatus {
        IssueStatus {
            number: 42,
            state,
            url: "https://github.com/acme/widgets/issues/42".to_string(),
            error: None,
        }
    }

    fn merged_project() -> ProjectStatus {
        ProjectStatus {
            work_branch: WorkBranchStatus {
                local_branch_found: true,
                remote_branch_found: true,
                sync_status: Some(SyncStatus::InSync),
                local_branch_removed: false,
            },
            local_changes: Some(MergeStatus {
                merged_to_local_main: true,
                merged_to_remote_main: true,
            }),
            remote_changes: None,
            pull_requests: vec![PullRequestSummary {
                number: 1,
                state: "closed".to_string(),
                merged: true,
                url: "https://github.com/acme/widgets/pull/1".to_string(),
            }],
            total_prs: 1,
            error: None,
        }
    }

    fn report(issue_state: IssueState, projects: Vec<(&str, ProjectStatus)>) -> StatusReport {
        let mut report = StatusReport::default();
        report.issues.insert("acme/widgets/42".to_string(), issue(issue_state));
        for (name, status) in projects {
            report.projects.insert(name.to_string(), status);
        }
        report
    }

    #[test]
    fn test_closable_when_all_merged() {
        let unit = unit(&["acme/widgets"]);
        let report = report(IssueState::Closed, vec![("acme/widgets", merged_project())]);
        assert_eq!(evaluate_closable(&unit, &report), Closability::closable());
    }

    #[test]
    fn test_not_closable_with_open_or_unknown_issue() {
        let unit = unit(&["acme/widgets"]);
        for state in [IssueState::Open, IssueState::Unknown] {
            let report = report(state, vec![("acme/widgets", merged_project())]);
            let decision = evaluate_closable(&unit, &report);
            assert!(!decision.closable);
            assert!(matches!(decision.blocker, Some(CloseBlocker::OpenIssues { .. })));
        }
    }

    #[test]
    fn test_short_circuits_in_declared_order() {
        // Declared order is gears then widgets, which is not map order
        let unit = unit(&["acme/widgets", "acme/gears"]);
        let mut no_pr = merged_project();
        no_pr.pull_requests.clear();
        let mut ahead = merged_project();
        ahead.work_branch.sync_status = Some(SyncStatus::LocalAhead);

        let report = report(IssueState::Closed, vec![("acme/widgets", no_pr), ("acme/gears", ahead)]);
        let decision = evaluate_closable(&unit, &report);
        assert_eq!(
            decision.blocker,
            Some(CloseBlocker::NoMergedPullRequest {
                project: "acme/widgets".to_string()
            })
        );
    }

    #[test]
    fn test_local_ahead_blocks() {
        let unit = unit(&["acme/widgets"]);
        let mut ahead = merged_project();
        ahead.work_branch.sync_status = Some(SyncStatus::LocalAhead);
        let report = report(IssueState::Closed, vec![("acme/widgets", ahead)]);
        assert!(matches!(
            evaluate_closable(&unit, &report).blocker,
            Some(CloseBlocker::LocalAhead { .. })
        ));
    }

    #[test]
    fn test_reconcile_error_blocks() {
        let unit = unit(&["acme/widgets"]);
        let mut failed = merged_project();
        failed.error = Some("fetch failed".to_string());
        let report = report(IssueState::Closed, vec![("acme/widgets", failed)]);
        assert!(matches!(
            evaluate_closable(&unit, &report).blocker,
            Some(CloseBlocker::Unreconciled { .. })
        ));
    }

    #[test]
    fn test_deletion_skip_reasons() {
        let mut status = merged_project();
        assert_eq!(deletion_skip_reason(&status), None);

        status.local_changes = Some(MergeStatus {
            merged_to_local_main: true,
            merged_to_remote_main: false,
        });
        assert_eq!(deletion_skip_reason(&status), Some(SkipReason::NotMerged));

        status.work_branch.local_branch_found = false;
        status.local_changes = None;
        assert_eq!(deletion_skip_reason(&status), Some(SkipReason::NotFound));
        assert_eq!(SkipReason::NotFound.to_string(), "not found");
    }
}
