//! Pausing and resuming work: moving every project between main and the work branch

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use workstore::ProjectRef;

use super::BranchReconciler;
use crate::error::WorkError;
use crate::git::Head;
use crate::tasklog::TaskLog;

/// Which way projects are moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchDirection {
    /// From the work branch back to main
    Pause,
    /// From main onto the work branch
    Resume,
}

impl SwitchDirection {
    fn verb(&self) -> &'static str {
        match self {
            SwitchDirection::Pause => "pause",
            SwitchDirection::Resume => "resume",
        }
    }
}

/// Outcome of a pause or resume across a unit's projects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwitchReport {
    /// Projects checked out onto the target branch
    pub switched: Vec<ProjectRef>,
    /// Projects already on the target branch
    pub skipped: Vec<ProjectRef>,
}

struct PlannedSwitch {
    project: ProjectRef,
    repo: PathBuf,
    from: String,
    to: String,
}

impl BranchReconciler {
    /// Move every project between its main branch and `work_key`
    ///
    /// All or nothing: every project must be either clean on the source
    /// branch or already on the target branch before anything is checked out.
    /// A checkout failure part way through switches the earlier projects back.
    pub async fn switch_projects(
        &self,
        projects: &[ProjectRef],
        work_key: &str,
        direction: SwitchDirection,
        log: &mut TaskLog,
    ) -> Result<SwitchReport, WorkError> {
        debug!(%work_key, ?direction, count = projects.len(), "BranchReconciler::switch_projects: called");
        let verb = direction.verb();

        // Hold every working copy for the whole switch, locked in path order
        let mut repos: Vec<PathBuf> = projects.iter().map(|p| self.playground.project_path(p)).collect();
        repos.sort();
        repos.dedup();
        let mut guards: Vec<OwnedMutexGuard<()>> = Vec::with_capacity(repos.len());
        for repo in &repos {
            guards.push(self.locks.lock(repo).await);
        }

        let mut planned = Vec::new();
        let mut report = SwitchReport::default();
        for project in projects {
            let repo = self.playground.project_path(project);
            let head = self
                .git
                .head(&repo)
                .await
                .map_err(WorkError::git(format!("Could not determine current branch of {}", project)))?;
            let (_, main) = self
                .git
                .origin_and_main(&repo)
                .await
                .map_err(WorkError::git(format!("Could not determine main branch of {}", project)))?;

            let (source, target) = match direction {
                SwitchDirection::Pause => (work_key, main.as_str()),
                SwitchDirection::Resume => (main.as_str(), work_key),
            };

            if head == Head::Branch(target.to_string()) {
                log.info(format!("Skipping {}; already on branch '{}'.", project, target));
                report.skipped.push(project.clone());
                continue;
            }
            if head != Head::Branch(source.to_string()) {
                return Err(WorkError::BadRequest(format!(
                    "Project '{}' is on '{}', neither '{}' nor '{}'; {} aborted.",
                    project, head, main, work_key, verb
                )));
            }

            let clean = self
                .git
                .is_clean(&repo)
                .await
                .map_err(WorkError::git(format!("Could not check working tree of {}", project)))?;
            if !clean {
                return Err(WorkError::BadRequest(format!(
                    "Project '{}' has uncommitted changes on '{}'; {} aborted. You may need to 'commit' or 'stash' your work",
                    project, source, verb
                )));
            }
            if direction == SwitchDirection::Resume {
                let has_work = self
                    .git
                    .has_local_branch(&repo, work_key)
                    .await
                    .map_err(WorkError::git(format!("Failed to inspect {}", project)))?;
                if !has_work {
                    return Err(WorkError::BadRequest(format!(
                        "Project '{}' has no local work branch '{}'; {} aborted.",
                        project, work_key, verb
                    )));
                }
            }

            planned.push(PlannedSwitch {
                project: project.clone(),
                repo,
                from: source.to_string(),
                to: target.to_string(),
            });
        }

        for (done, step) in planned.iter().enumerate() {
            log.info(format!(
                "Switching {} from '{}' to '{}'...",
                step.project, step.from, step.to
            ));
            if let Err(e) = self.git.checkout(&step.repo, &step.to).await {
                self.switch_back(&planned[..done], log).await;
                return Err(WorkError::git(format!(
                    "Failed to switch {} to '{}'; {} aborted",
                    step.project, step.to, verb
                ))(e));
            }
            report.switched.push(step.project.clone());
        }

        drop(guards);
        Ok(report)
    }

    async fn switch_back(&self, switched: &[PlannedSwitch], log: &mut TaskLog) {
        for step in switched.iter().rev() {
            match self.git.checkout(&step.repo, &step.from).await {
                Ok(()) => log.warn(format!("Switched {} back to '{}'.", step.project, step.from)),
                Err(e) => {
                    warn!(project = %step.project, error = %e, "BranchReconciler::switch_back: failed");
                    log.error(format!(
                        "Could not switch {} back to '{}': {}",
                        step.project, step.from, e
                    ));
                }
            }
        }
    }
}
