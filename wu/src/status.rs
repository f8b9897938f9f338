//! Status aggregation across a unit of work

use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;
use workstore::{IssueRef, WorkUnit};

use crate::reconcile::BranchReconciler;
use crate::report::{IssueState, IssueStatus, StatusOptions, StatusReport};
use crate::tasklog::TaskLog;
use crate::tracker::TrackerFacade;

/// Fans issue lookups and project reconciliation out over a unit of work
///
/// Issue lookups run concurrently with each other, project reconciliations run
/// concurrently with each other, and the two groups run side by side. No
/// lifecycle policy is applied here.
pub struct StatusAggregator {
    tracker: Arc<dyn TrackerFacade>,
    reconciler: Arc<BranchReconciler>,
}

impl StatusAggregator {
    pub fn new(tracker: Arc<dyn TrackerFacade>, reconciler: Arc<BranchReconciler>) -> Self {
        Self { tracker, reconciler }
    }

    pub async fn reconcile(&self, unit: &WorkUnit, options: &StatusOptions, log: &mut TaskLog) -> StatusReport {
        debug!(key = %unit.key, ?options, "StatusAggregator::reconcile: called");

        let issues = join_all(unit.issues.iter().map(|entry| self.issue_status(&entry.id)));
        let projects = join_all(
            unit.projects
                .iter()
                .map(|project| self.reconciler.project_status(project, &unit.key, options)),
        );
        let (issues, projects) = tokio::join!(issues, projects);

        let mut report = StatusReport::default();
        for (entry, (status, issue_log)) in unit.issues.iter().zip(issues) {
            log.extend(issue_log);
            report.issues.insert(entry.id.to_string(), status);
        }
        for (project, (status, project_log)) in unit.projects.iter().zip(projects) {
            log.extend(project_log);
            report.projects.insert(project.name.to_string(), status);
        }

        debug!(
            issues = report.issues.len(),
            projects = report.projects.len(),
            "StatusAggregator::reconcile: done"
        );
        report
    }

    async fn issue_status(&self, id: &IssueRef) -> (IssueStatus, TaskLog) {
        let mut log = TaskLog::new();
        let status = match self.tracker.get_issue(&id.org, &id.project, id.number).await {
            Ok(issue) => IssueStatus {
                number: issue.number,
                state: IssueState::from_tracker(&issue.state),
                url: issue.url,
                error: None,
            },
            Err(e) => {
                log.error(format!("Failed to retrieve issue {}: {}", id, e));
                IssueStatus {
                    number: id.number,
                    state: IssueState::Unknown,
                    url: String::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        (status, log)
    }
}
