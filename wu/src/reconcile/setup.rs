//! Work branch setup

use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use workstore::ProjectRef;

use super::{BranchAction, BranchReconciler};
use crate::error::WorkError;
use crate::tasklog::TaskLog;
use crate::tracker::RepoInfo;

/// Result of setting up a work branch in one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchSetup {
    pub private: bool,
    pub action: BranchAction,
}

impl BranchReconciler {
    /// Make the work branch exist locally and on the effective remote
    ///
    /// Private projects use `origin`. Public projects use a personal fork,
    /// created if missing, reached through the fork remote.
    pub async fn setup_work_branch(
        &self,
        project: &ProjectRef,
        work_key: &str,
        log: &mut TaskLog,
    ) -> Result<BranchSetup, WorkError> {
        debug!(%project, %work_key, "BranchReconciler::setup_work_branch: called");
        log.info(format!("Processing work branch for {}...", project));

        let info: RepoInfo = self
            .tracker
            .get_repo(&project.org, &project.project)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    WorkError::NotFound(format!("Could not find project '{}' repo on the tracker", project))
                } else {
                    WorkError::tracker(format!("Failed to read repository {}", project))(e)
                }
            })?;

        if info.default_branch == work_key {
            return Err(WorkError::BadRequest(format!(
                "Work branch '{}' is the default branch of {}",
                work_key, project
            )));
        }

        let repo = self.playground.project_path(project);
        let _guard = self.locks.lock(&repo).await;

        let has_default = self
            .git
            .has_local_branch(&repo, &info.default_branch)
            .await
            .map_err(WorkError::git(format!("Failed to inspect {}", project)))?;
        if !has_default {
            return Err(WorkError::BadRequest(format!(
                "{} has no local default branch '{}'",
                project, info.default_branch
            )));
        }

        let current = self
            .git
            .current_branch(&repo)
            .await
            .map_err(WorkError::git(format!("Could not determine current branch of {}", project)))?;
        if current != info.default_branch && current != work_key {
            return Err(WorkError::BadRequest(format!(
                "{} must be on branch '{}' or '{}' (currently on '{}')",
                project, info.default_branch, work_key, current
            )));
        }

        let action = if info.private {
            log.info(format!("Setting up private work branch {}...", work_key));
            let (origin, _) = self
                .git
                .origin_and_main(&repo)
                .await
                .map_err(WorkError::git(format!("Could not determine origin of {}", project)))?;
            self.reconcile_branch(&repo, project, &project.org, &origin, work_key, log)
                .await?
        } else {
            log.info(format!("Setting up public work branch {}...", work_key));
            let login = self.ensure_fork(project, log).await?;
            self.ensure_fork_remote(&repo, project, &login, log).await?;
            let fork_remote = self.fork_remote.clone();
            self.reconcile_branch(&repo, project, &login, &fork_remote, work_key, log)
                .await?
        };

        Ok(BranchSetup {
            private: info.private,
            action,
        })
    }

    /// Ensure the authenticated user has a fork of `project`, returning their login
    async fn ensure_fork(&self, project: &ProjectRef, log: &mut TaskLog) -> Result<String, WorkError> {
        let login = self
            .tracker
            .current_login()
            .await
            .map_err(WorkError::tracker("Failed to determine tracker login"))?;

        match self.tracker.get_repo(&login, &project.project).await {
            Ok(_) => {
                debug!(%login, %project, "BranchReconciler::ensure_fork: fork exists");
            }
            Err(e) if e.is_not_found() => {
                log.info(format!(
                    "Creating fork {}/{} (from {})",
                    login, project.project, project
                ));
                self.tracker
                    .create_fork(&project.org, &project.project)
                    .await
                    .map_err(WorkError::tracker(format!("Failed to fork {}", project)))?;
            }
            Err(e) => {
                return Err(WorkError::tracker(format!("Failed to check for fork {}/{}", login, project.project))(e));
            }
        }
        Ok(login)
    }

    /// Ensure the fork remote exists and points at `<login>/<project>`
    async fn ensure_fork_remote(
        &self,
        repo: &Path,
        project: &ProjectRef,
        login: &str,
        log: &mut TaskLog,
    ) -> Result<(), WorkError> {
        let existing = self
            .git
            .remote_url(repo, &self.fork_remote)
            .await
            .map_err(WorkError::git(format!("Failed to read remotes of {}", project)))?;

        match existing {
            Some(url) => {
                let pattern = format!(r"/{}(?:\.git)?/?$", regex::escape(&project.project));
                let matcher = Regex::new(&pattern).map_err(|e| WorkError::BadRequest(e.to_string()))?;
                if !matcher.is_match(url.trim()) {
                    return Err(WorkError::BadRequest(format!(
                        "Project {} has a '{}' remote with an unexpected URL ({}). Check and address.",
                        project, self.fork_remote, url
                    )));
                }
                Ok(())
            }
            None => {
                let url = format!("git@github.com:{}/{}.git", login, project.project);
                log.info(format!(
                    "Creating local remote '{}' for '{}/{}'",
                    self.fork_remote, login, project.project
                ));
                self.git
                    .add_remote(repo, &self.fork_remote, &url)
                    .await
                    .map_err(WorkError::git(format!("Failed to add remote to {}", project)))
            }
        }
    }

    /// Apply the existence table for the work branch against `remote`
    ///
    /// Remote existence is asked of the tracker, on the repository owned by
    /// `owner` (the upstream org or the user's fork).
    async fn reconcile_branch(
        &self,
        repo: &Path,
        project: &ProjectRef,
        owner: &str,
        remote: &str,
        work_key: &str,
        log: &mut TaskLog,
    ) -> Result<BranchAction, WorkError> {
        let remote_exists = self
            .tracker
            .branch_exists(owner, &project.project, work_key)
            .await
            .map_err(WorkError::tracker(format!("Failed to check for branch on {}/{}", owner, project.project)))?;
        let local_exists = self
            .git
            .has_local_branch(repo, work_key)
            .await
            .map_err(WorkError::git(format!("Failed to check local branch in {}", project)))?;

        log.info(format!(
            "Has remote branch: {}, has local branch: {}; remote is {}",
            remote_exists, local_exists, remote
        ));
        let action = BranchAction::plan(remote_exists, local_exists);
        log.info(action.describe(work_key));

        let failed = format!(
            "Failed to set up branch '{}' in {} against {}. You may need to 'commit' or 'stash' your work",
            work_key, project, remote
        );
        match action {
            BranchAction::CreateAndPush => {
                self.git
                    .create_branch(repo, work_key)
                    .await
                    .map_err(WorkError::git(failed.clone()))?;
                self.git
                    .push_set_upstream(repo, remote, work_key)
                    .await
                    .map_err(WorkError::git(failed))?;
            }
            BranchAction::TrackRemote => {
                self.git
                    .track_remote_branch(repo, remote, work_key)
                    .await
                    .map_err(WorkError::git(failed))?;
            }
            BranchAction::PushLocal => {
                self.git
                    .push_set_upstream(repo, remote, work_key)
                    .await
                    .map_err(WorkError::git(failed))?;
            }
            BranchAction::Nothing => {}
        }
        Ok(action)
    }
}
