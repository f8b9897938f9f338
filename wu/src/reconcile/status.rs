//! Project status collection

use std::path::Path;
use tracing::debug;
use workstore::{ProjectEntry, ProjectRef};

use super::BranchReconciler;
use crate::error::WorkError;
use crate::report::{MergeStatus, ProjectStatus, PullRequestSummary, StatusOptions};
use crate::tasklog::TaskLog;
use crate::tracker::PullRequestQuery;

impl BranchReconciler {
    /// Reconcile one project's work branch state
    ///
    /// Never fails: a failing step records `error` on the returned status and
    /// an error entry in the returned log, keeping whatever was learned first.
    pub async fn project_status(
        &self,
        project: &ProjectEntry,
        work_key: &str,
        options: &StatusOptions,
    ) -> (ProjectStatus, TaskLog) {
        debug!(project = %project.name, %work_key, ?options, "BranchReconciler::project_status: called");
        let mut status = ProjectStatus::default();
        let mut log = TaskLog::new();
        log.info(format!("Checking status of {}...", project.name));

        if let Err(e) = self.collect_status(project, work_key, options, &mut status, &mut log).await {
            log.error(format!("{}: {}", project.name, e));
            status.error = Some(e.to_string());
        }
        (status, log)
    }

    async fn collect_status(
        &self,
        project: &ProjectEntry,
        work_key: &str,
        options: &StatusOptions,
        status: &mut ProjectStatus,
        log: &mut TaskLog,
    ) -> Result<(), WorkError> {
        let name = &project.name;
        let repo = self.playground.project_path(name);

        {
            let _guard = self.locks.lock(&repo).await;

            let (origin, main) = self
                .git
                .origin_and_main(&repo)
                .await
                .map_err(WorkError::git(format!("Could not determine origin and main branch of {}", name)))?;
            let remote = if project.private {
                origin.clone()
            } else {
                self.fork_remote.clone()
            };

            if !options.no_fetch {
                log.info(format!("Fetching from remote {}...", remote));
                self.git
                    .fetch(&repo, &remote)
                    .await
                    .map_err(WorkError::git(format!("Failed to fetch {} in {}", remote, name)))?;
                if remote != origin {
                    self.git
                        .fetch(&repo, &origin)
                        .await
                        .map_err(WorkError::git(format!("Failed to fetch {} in {}", origin, name)))?;
                }
            }

            let has_local = self
                .git
                .has_local_branch(&repo, work_key)
                .await
                .map_err(WorkError::git(format!("Failed to check local branch in {}", name)))?;
            let has_remote = self
                .git
                .has_remote_branch(&repo, &remote, work_key)
                .await
                .map_err(WorkError::git(format!("Failed to check remote branch in {}", name)))?;
            status.work_branch.local_branch_found = has_local;
            status.work_branch.remote_branch_found = has_remote;

            if options.update_local {
                let update = self.merge_upstream(&repo, name, &origin, &main, &remote, work_key, has_local && has_remote, log);
                self.with_branch_restored(&repo, name, update).await?;
            }

            let remote_main = format!("{}/{}", origin, main);
            if has_local {
                log.info(format!("Analyzing merge state of local work branch {}...", work_key));
                status.local_changes = Some(self.merge_status(&repo, name, work_key, &main, &remote_main).await?);
            }
            if has_remote {
                log.info(format!("Analyzing merge state of remote work branch {}...", work_key));
                let remote_branch = format!("{}/{}", remote, work_key);
                status.remote_changes = Some(
                    self.merge_status(&repo, name, &remote_branch, &main, &remote_main)
                        .await?,
                );
            }

            if has_local && has_remote {
                let sync = self
                    .git
                    .compare(&repo, work_key, &remote)
                    .await
                    .map_err(WorkError::git(format!("Failed to compare {} with {}/{}", work_key, remote, work_key)))?;
                status.work_branch.sync_status = Some(sync);
            }
        }

        log.info(format!("Retrieving pull requests associated with head '{}'...", work_key));
        let pulls = self
            .tracker
            .list_pull_requests(&name.org, &name.project, &PullRequestQuery::head(work_key))
            .await
            .map_err(WorkError::tracker(format!("Failed to list pull requests for {}", name)))?;

        // The host may ignore an unqualified head filter; match exactly here
        let matching: Vec<_> = pulls.into_iter().filter(|pr| pr.head.branch == work_key).collect();
        status.total_prs = matching.len();
        status.pull_requests = matching
            .into_iter()
            .filter(|pr| options.all_pulls || pr.is_merged() || pr.is_open())
            .map(|pr| PullRequestSummary {
                merged: pr.is_merged(),
                number: pr.number,
                state: pr.state,
                url: pr.url,
            })
            .collect();

        Ok(())
    }

    /// Merge `<origin>/<main>` into local main and, when both exist, the remote work branch into the local one
    #[allow(clippy::too_many_arguments)]
    async fn merge_upstream(
        &self,
        repo: &Path,
        name: &ProjectRef,
        origin: &str,
        main: &str,
        remote: &str,
        work_key: &str,
        both_branches: bool,
        log: &mut TaskLog,
    ) -> Result<(), WorkError> {
        let origin_main = format!("{}/{}", origin, main);
        log.info(format!("Updating local {} branch from {}...", main, origin_main));
        let failed = format!(
            "Failed attempt to switch {} to {} branch and merge {}. You may need to 'commit' or 'stash' your work",
            name, main, origin_main
        );
        self.git.checkout(repo, main).await.map_err(WorkError::git(failed.clone()))?;
        self.git.merge(repo, &origin_main).await.map_err(WorkError::git(failed))?;

        if both_branches {
            let remote_branch = format!("{}/{}", remote, work_key);
            log.info(format!("Updating local {} branch from {}...", work_key, remote_branch));
            let failed = format!(
                "Failed attempt to switch {} to branch {} and merge {}. You may need to 'commit' or 'stash' your work",
                name, work_key, remote_branch
            );
            self.git
                .checkout(repo, work_key)
                .await
                .map_err(WorkError::git(failed.clone()))?;
            self.git.merge(repo, &remote_branch).await.map_err(WorkError::git(failed))?;
        }
        Ok(())
    }

    async fn merge_status(
        &self,
        repo: &Path,
        name: &ProjectRef,
        branch: &str,
        main: &str,
        remote_main: &str,
    ) -> Result<MergeStatus, WorkError> {
        let context = format!("Failed to analyze merge state of {} in {}", branch, name);
        let merged_to_local_main = self
            .git
            .contains(repo, branch, main)
            .await
            .map_err(WorkError::git(context.clone()))?;
        let merged_to_remote_main = self
            .git
            .contains(repo, branch, remote_main)
            .await
            .map_err(WorkError::git(context))?;
        Ok(MergeStatus {
            merged_to_local_main,
            merged_to_remote_main,
        })
    }
}
