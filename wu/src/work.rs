//! Work service: store mutations composed with tracker and git effects

use chrono::Utc;
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use workstore::{IssueEntry, IssueRef, ProjectEntry, ProjectRef, StoreError, WorkStore, WorkUnit, work_branch_name};

use crate::error::WorkError;
use crate::git::GitFacade;
use crate::providers::Providers;
use crate::reconcile::{BranchReconciler, SwitchDirection, SwitchReport};
use crate::tasklog::TaskLog;
use crate::tracker::TrackerFacade;

/// Parameters for starting a unit of work
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Defaults to the title of the first issue
    pub description: Option<String>,
    /// The first issue determines the work key
    pub issues: Vec<String>,
    /// Defaults to the project of the first issue
    pub projects: Vec<String>,
    pub link: bool,
}

pub struct WorkService {
    git: Arc<dyn GitFacade>,
    tracker: Arc<dyn TrackerFacade>,
    reconciler: Arc<BranchReconciler>,
    providers: Providers,
}

impl WorkService {
    pub fn new(
        git: Arc<dyn GitFacade>,
        tracker: Arc<dyn TrackerFacade>,
        reconciler: Arc<BranchReconciler>,
        providers: Providers,
    ) -> Self {
        Self {
            git,
            tracker,
            reconciler,
            providers,
        }
    }

    /// Use `key` if given, otherwise the current branch of `cwd` when it names open work
    pub async fn resolve_key(&self, store: &WorkStore, key: Option<&str>, cwd: &Path) -> Result<String, WorkError> {
        debug!(?key, cwd = %cwd.display(), "WorkService::resolve_key: called");
        if let Some(key) = key {
            return Ok(key.to_string());
        }

        let branch = self.git.current_branch(cwd).await.map_err(|e| {
            WorkError::BadRequest(format!(
                "No work key given and none could be implied from {}: {}",
                cwd.display(),
                e
            ))
        })?;
        if !store.contains(&branch) {
            return Err(WorkError::NotFound(format!(
                "Current branch '{}' is not an open unit of work; specify the work key",
                branch
            )));
        }
        Ok(branch)
    }

    /// Start a unit of work, setting up the work branch in every project
    ///
    /// A failure after the record is written removes it again.
    pub async fn create(
        &self,
        store: &mut WorkStore,
        request: CreateRequest,
        log: &mut TaskLog,
    ) -> Result<WorkUnit, WorkError> {
        debug!(?request, "WorkService::create: called");
        let Some(first_issue) = request.issues.first() else {
            return Err(WorkError::BadRequest("At least one issue is required to start work".to_string()));
        };

        let mut projects = request
            .projects
            .iter()
            .map(|p| ProjectRef::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        let primary_issue = IssueRef::normalize(first_issue, projects.first())?;
        if projects.is_empty() {
            projects.push(primary_issue.project_ref());
        }
        let issues = request
            .issues
            .iter()
            .map(|i| IssueRef::normalize(i, projects.first()))
            .collect::<Result<Vec<_>, _>>()?;

        let key = work_branch_name(&primary_issue);
        if store.contains(&key) {
            return Err(StoreError::AlreadyExists(key).into());
        }

        let description = match request.description {
            Some(description) => description,
            None => {
                log.info(format!(
                    "Trying to determine work description from issue '{}' title...",
                    primary_issue
                ));
                let title = self.issue_title(&primary_issue).await?;
                log.info(format!("  got: {}", title));
                title
            }
        };
        let initiator = self.providers.identity.initiator().await?;

        store.insert(WorkUnit::new(&key, description, initiator, Utc::now()))?;
        let populated = self.populate(store, &key, issues, projects, request.link, log).await;
        match populated {
            Ok(unit) => {
                info!(%key, "Started unit of work");
                Ok(unit)
            }
            Err(e) => {
                log.error(format!("Failed to start {}; removing the partial record.", key));
                if let Err(rollback) = store.close(&key) {
                    warn!(%key, error = %rollback, "WorkService::create: rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn populate(
        &self,
        store: &mut WorkStore,
        key: &str,
        issues: Vec<IssueRef>,
        projects: Vec<ProjectRef>,
        link: bool,
        log: &mut TaskLog,
    ) -> Result<WorkUnit, WorkError> {
        self.add_issue_refs(store, key, issues, log).await?;
        self.add_project_refs(store, key, projects, link, log).await
    }

    /// Link issues, normalizing bare numbers against the primary project
    pub async fn add_issues(
        &self,
        store: &mut WorkStore,
        key: &str,
        issues: &[String],
        log: &mut TaskLog,
    ) -> Result<WorkUnit, WorkError> {
        debug!(%key, ?issues, "WorkService::add_issues: called");
        let unit = store.require(key)?;
        let refs = issues
            .iter()
            .map(|i| IssueRef::normalize(i, unit.primary_project()))
            .collect::<Result<Vec<_>, _>>()?;
        self.add_issue_refs(store, key, refs, log).await
    }

    async fn add_issue_refs(
        &self,
        store: &mut WorkStore,
        key: &str,
        refs: Vec<IssueRef>,
        log: &mut TaskLog,
    ) -> Result<WorkUnit, WorkError> {
        let unit = store.require(key)?;
        let new_refs = fresh(refs, |r| unit.has_issue(r));
        if new_refs.is_empty() {
            log.info(format!("No new issues to add to {}.", key));
            return Ok(unit);
        }

        let entries = try_join_all(new_refs.into_iter().map(|id| async move {
            let summary = self.issue_title(&id).await?;
            Ok::<_, WorkError>(IssueEntry { id, summary })
        }))
        .await?;

        for entry in &entries {
            log.info(format!("Adding issue {} ({})", entry.id, entry.summary));
        }
        Ok(store.append_issues(key, entries)?)
    }

    /// Add projects, setting up the work branch in each before anything is saved
    pub async fn add_projects(
        &self,
        store: &mut WorkStore,
        key: &str,
        projects: &[String],
        link: bool,
        log: &mut TaskLog,
    ) -> Result<WorkUnit, WorkError> {
        debug!(%key, ?projects, link, "WorkService::add_projects: called");
        let refs = projects
            .iter()
            .map(|p| ProjectRef::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        self.add_project_refs(store, key, refs, link, log).await
    }

    async fn add_project_refs(
        &self,
        store: &mut WorkStore,
        key: &str,
        refs: Vec<ProjectRef>,
        link: bool,
        log: &mut TaskLog,
    ) -> Result<WorkUnit, WorkError> {
        let mut unit = store.require(key)?;
        let new_refs = fresh(refs, |r| unit.has_project(r));

        if !new_refs.is_empty() {
            let mut entries = Vec::with_capacity(new_refs.len());
            for name in new_refs {
                let setup = self.reconciler.setup_work_branch(&name, key, log).await?;
                entries.push(ProjectEntry {
                    name,
                    private: setup.private,
                });
            }
            unit = store.append_projects(key, entries)?;
        } else {
            log.info(format!("No new projects to add to {}.", key));
        }

        if link {
            let all: BTreeSet<ProjectRef> = store
                .keys()
                .iter()
                .filter_map(|k| store.get(k))
                .flat_map(|u| u.projects.into_iter().map(|p| p.name))
                .collect();
            let all: Vec<ProjectRef> = all.into_iter().collect();
            if let Err(e) = self.providers.linker.link(&all, log).await {
                log.warn(format!("Linking dev projects failed: {}", e));
            }
        }
        Ok(unit)
    }

    pub fn remove_issues(&self, store: &mut WorkStore, key: &str, issues: &[String]) -> Result<WorkUnit, WorkError> {
        debug!(%key, ?issues, "WorkService::remove_issues: called");
        let unit = store.require(key)?;
        let refs = issues
            .iter()
            .map(|i| IssueRef::normalize(i, unit.primary_project()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(store.remove_issues(key, &refs)?)
    }

    pub fn remove_projects(
        &self,
        store: &mut WorkStore,
        key: &str,
        projects: &[String],
    ) -> Result<WorkUnit, WorkError> {
        debug!(%key, ?projects, "WorkService::remove_projects: called");
        let refs = projects
            .iter()
            .map(|p| ProjectRef::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(store.remove_projects(key, &refs)?)
    }

    /// Switch every project of the unit from the work branch back to main
    pub async fn pause(&self, store: &WorkStore, key: &str, log: &mut TaskLog) -> Result<SwitchReport, WorkError> {
        debug!(%key, "WorkService::pause: called");
        self.switch(store, key, SwitchDirection::Pause, log).await
    }

    /// Switch every project of the unit from main onto the work branch
    pub async fn resume(&self, store: &WorkStore, key: &str, log: &mut TaskLog) -> Result<SwitchReport, WorkError> {
        debug!(%key, "WorkService::resume: called");
        self.switch(store, key, SwitchDirection::Resume, log).await
    }

    async fn switch(
        &self,
        store: &WorkStore,
        key: &str,
        direction: SwitchDirection,
        log: &mut TaskLog,
    ) -> Result<SwitchReport, WorkError> {
        let unit = store.require(key)?;
        let projects: Vec<ProjectRef> = unit.projects.into_iter().map(|p| p.name).collect();
        self.reconciler.switch_projects(&projects, key, direction, log).await
    }

    async fn issue_title(&self, id: &IssueRef) -> Result<String, WorkError> {
        self.tracker
            .get_issue(&id.org, &id.project, id.number)
            .await
            .map(|issue| issue.title)
            .map_err(|e| {
                if e.is_not_found() {
                    WorkError::NotFound(format!("No such issue '{}'", id))
                } else {
                    WorkError::tracker(format!("Failed to retrieve issue {}", id))(e)
                }
            })
    }
}

/// Drop repeats and anything `existing` already holds, keeping first-seen order
fn fresh<T: Ord + Clone>(refs: Vec<T>, existing: impl Fn(&T) -> bool) -> Vec<T> {
    let mut seen = BTreeSet::new();
    refs.into_iter()
        .filter(|r| !existing(r) && seen.insert(r.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_keeps_order_and_drops_repeats() {
        let refs = vec![3, 1, 3, 2, 1];
        assert_eq!(fresh(refs, |r| *r == 2), vec![3, 1]);
    }
}
