//! Per-project branch reconciliation
//!
//! [`BranchReconciler`] owns every git and tracker interaction that concerns a
//! single project: gathering its status fragment, setting up the work branch,
//! switching to and from it, and deleting it. Git operations for one working
//! copy are serialized through [`RepoLocks`]; different projects proceed
//! independently.

mod action;
mod setup;
mod status;
mod switch;

pub use action::BranchAction;
pub use setup::BranchSetup;
pub use switch::{SwitchDirection, SwitchReport};

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use workstore::ProjectRef;

use crate::error::WorkError;
use crate::git::{GitFacade, Head, RepoLocks};
use crate::paths::Playground;
use crate::tasklog::TaskLog;
use crate::tracker::TrackerFacade;

pub struct BranchReconciler {
    git: Arc<dyn GitFacade>,
    tracker: Arc<dyn TrackerFacade>,
    playground: Playground,
    fork_remote: String,
    locks: RepoLocks,
}

impl BranchReconciler {
    pub fn new(
        git: Arc<dyn GitFacade>,
        tracker: Arc<dyn TrackerFacade>,
        playground: Playground,
        fork_remote: impl Into<String>,
    ) -> Self {
        let fork_remote = fork_remote.into();
        debug!(%fork_remote, "BranchReconciler::new: called");
        Self {
            git,
            tracker,
            playground,
            fork_remote,
            locks: RepoLocks::new(),
        }
    }

    /// Switch off the work branch if it is checked out, then delete it locally
    ///
    /// Callers only ask for deletion once the branch is known to be merged to
    /// the remote main branch, so a refusal from `git branch -d` (the local
    /// main may simply be stale) is retried with force.
    pub async fn delete_work_branch(
        &self,
        project: &ProjectRef,
        work_key: &str,
        log: &mut TaskLog,
    ) -> Result<(), WorkError> {
        debug!(%project, %work_key, "BranchReconciler::delete_work_branch: called");
        let repo = self.playground.project_path(project);
        let _guard = self.locks.lock(&repo).await;

        let current = self
            .git
            .current_branch(&repo)
            .await
            .map_err(WorkError::git(format!("Could not determine current branch of {}", project)))?;

        if current == work_key {
            let (_, main) = self
                .git
                .origin_and_main(&repo)
                .await
                .map_err(WorkError::git(format!("Could not determine main branch of {}", project)))?;
            log.info(format!(
                "Switching current branch from '{}' to '{}' before deleting '{}'...",
                work_key, main, work_key
            ));
            let switch_failed = format!(
                "Cannot switch from branch '{}' to '{}' in order to delete branch '{}'. You may need to 'commit' or 'stash' your work",
                work_key, main, work_key
            );
            let clean = self
                .git
                .is_clean(&repo)
                .await
                .map_err(WorkError::git(switch_failed.clone()))?;
            if !clean {
                return Err(WorkError::BadRequest(format!("{}: {}", project, switch_failed)));
            }
            self.git
                .checkout(&repo, &main)
                .await
                .map_err(WorkError::git(switch_failed))?;
        }

        if let Err(e) = self.git.delete_branch(&repo, work_key, false).await {
            warn!(%project, error = %e, "BranchReconciler::delete_work_branch: safe delete refused, forcing");
            self.git
                .delete_branch(&repo, work_key, true)
                .await
                .map_err(WorkError::git(format!("Failed to delete branch '{}' in {}", work_key, project)))?;
        }
        log.info(format!("Removed local work branch '{}' from {}.", work_key, project));
        Ok(())
    }

    /// Run `work` in `repo`, then restore whatever HEAD was before, even if `work` failed
    ///
    /// A detached HEAD is restored to the same commit, still detached.
    async fn with_branch_restored<T, F>(&self, repo: &Path, project: &ProjectRef, work: F) -> Result<T, WorkError>
    where
        F: Future<Output = Result<T, WorkError>>,
    {
        let original = self
            .git
            .head(repo)
            .await
            .map_err(WorkError::git(format!("Could not determine current branch of {}", project)))?;

        let outcome = work.await;
        let restored = match &original {
            Head::Branch(branch) => self.git.checkout(repo, branch).await,
            Head::Detached(commit) => self.git.checkout_detached(repo, commit).await,
        };

        match (outcome, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(WorkError::git(format!(
                "Very unexpectedly failed to restore {} to branch {}",
                project, original
            ))(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore)) => {
                warn!(%project, %original, error = %restore, "BranchReconciler::with_branch_restored: restore failed");
                Err(e)
            }
        }
    }
}
