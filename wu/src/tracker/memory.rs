//! In-memory TrackerFacade for tests

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use super::{Issue, PullRequest, PullRequestHead, PullRequestQuery, RepoInfo, TrackerError, TrackerFacade};

#[derive(Debug, Default)]
struct State {
    issues: BTreeMap<(String, String, u64), Issue>,
    pulls: BTreeMap<(String, String), Vec<PullRequest>>,
    repos: BTreeMap<(String, String), RepoInfo>,
    branches: BTreeSet<(String, String, String)>,
    forks: Vec<(String, String)>,
    failing: HashSet<String>,
    login: String,
}

/// Tracker backed by in-memory maps
#[derive(Debug)]
pub struct MemoryTracker {
    state: Mutex<State>,
    issue_calls: AtomicUsize,
    pull_calls: AtomicUsize,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                login: "dev".to_string(),
                ..Default::default()
            }),
            issue_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn add_issue(&self, owner: &str, project: &str, number: u64, state: &str, title: &str) {
        debug!(%owner, %project, %number, %state, "MemoryTracker::add_issue: called");
        self.with_state(|s| {
            s.issues.insert(
                (owner.to_string(), project.to_string(), number),
                Issue {
                    number,
                    state: state.to_string(),
                    url: format!("https://github.com/{}/{}/issues/{}", owner, project, number),
                    title: title.to_string(),
                },
            );
        });
    }

    pub fn set_issue_state(&self, owner: &str, project: &str, number: u64, state: &str) {
        self.with_state(|s| {
            if let Some(issue) = s.issues.get_mut(&(owner.to_string(), project.to_string(), number)) {
                issue.state = state.to_string();
            }
        });
    }

    /// Add a pull request whose head is `head`; `merged` sets `merged_at`
    pub fn add_pull_request(&self, owner: &str, project: &str, number: u64, head: &str, state: &str, merged: bool) {
        self.with_state(|s| {
            s.pulls
                .entry((owner.to_string(), project.to_string()))
                .or_default()
                .push(PullRequest {
                    number,
                    state: state.to_string(),
                    merged_at: merged.then(|| "2024-01-01T00:00:00Z".to_string()),
                    url: format!("https://github.com/{}/{}/pull/{}", owner, project, number),
                    head: PullRequestHead {
                        branch: head.to_string(),
                    },
                });
        });
    }

    pub fn add_repo(&self, owner: &str, project: &str, private: bool, default_branch: &str) {
        self.with_state(|s| {
            s.repos.insert(
                (owner.to_string(), project.to_string()),
                RepoInfo {
                    private,
                    default_branch: default_branch.to_string(),
                },
            );
        });
    }

    pub fn add_branch(&self, owner: &str, project: &str, branch: &str) {
        self.with_state(|s| {
            s.branches
                .insert((owner.to_string(), project.to_string(), branch.to_string()));
        });
    }

    pub fn set_login(&self, login: &str) {
        self.with_state(|s| s.login = login.to_string());
    }

    /// Make every call touching `owner/project` fail with a 500
    pub fn fail_project(&self, owner: &str, project: &str) {
        self.with_state(|s| {
            s.failing.insert(format!("{}/{}", owner, project));
        });
    }

    /// Forks created so far, as `(owner, project)` of the source
    pub fn forks(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.forks.clone())
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    fn check(&self, owner: &str, project: &str) -> Result<(), TrackerError> {
        let failing = self.with_state(|s| s.failing.contains(&format!("{}/{}", owner, project)));
        if failing {
            return Err(TrackerError::ApiError {
                status: 500,
                message: format!("injected failure for {}/{}", owner, project),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TrackerFacade for MemoryTracker {
    async fn get_issue(&self, owner: &str, project: &str, number: u64) -> Result<Issue, TrackerError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.check(owner, project)?;
        self.with_state(|s| {
            s.issues
                .get(&(owner.to_string(), project.to_string(), number))
                .cloned()
                .ok_or_else(|| TrackerError::NotFound(format!("/repos/{}/{}/issues/{}", owner, project, number)))
        })
    }

    async fn list_pull_requests(
        &self,
        owner: &str,
        project: &str,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequest>, TrackerError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.check(owner, project)?;
        debug!(%owner, %project, head = %query.head, "MemoryTracker::list_pull_requests: called");
        // The host ignores an unqualified head filter, so return every pull request
        Ok(self.with_state(|s| {
            s.pulls
                .get(&(owner.to_string(), project.to_string()))
                .cloned()
                .unwrap_or_default()
        }))
    }

    async fn get_repo(&self, owner: &str, project: &str) -> Result<RepoInfo, TrackerError> {
        self.check(owner, project)?;
        self.with_state(|s| {
            s.repos
                .get(&(owner.to_string(), project.to_string()))
                .cloned()
                .ok_or_else(|| TrackerError::NotFound(format!("/repos/{}/{}", owner, project)))
        })
    }

    async fn branch_exists(&self, owner: &str, project: &str, branch: &str) -> Result<bool, TrackerError> {
        self.check(owner, project)?;
        Ok(self.with_state(|s| {
            s.branches
                .contains(&(owner.to_string(), project.to_string(), branch.to_string()))
        }))
    }

    async fn current_login(&self) -> Result<String, TrackerError> {
        Ok(self.with_state(|s| s.login.clone()))
    }

    async fn create_fork(&self, owner: &str, project: &str) -> Result<(), TrackerError> {
        self.check(owner, project)?;
        self.with_state(|s| {
            let source = s
                .repos
                .get(&(owner.to_string(), project.to_string()))
                .cloned()
                .ok_or_else(|| TrackerError::NotFound(format!("/repos/{}/{}", owner, project)))?;
            let login = s.login.clone();
            s.repos.insert((login, project.to_string()), source);
            s.forks.push((owner.to_string(), project.to_string()));
            Ok::<(), TrackerError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_branch_exists_is_false_when_absent() {
        let tracker = MemoryTracker::new();
        assert!(!tracker.branch_exists("acme", "widgets", "work-x").await.unwrap());
        tracker.add_branch("acme", "widgets", "work-x");
        assert!(tracker.branch_exists("acme", "widgets", "work-x").await.unwrap());
    }

    #[tokio::test]
    async fn test_fork_copies_repo_to_login() {
        let tracker = MemoryTracker::new();
        tracker.add_repo("acme", "widgets", false, "main");
        tracker.set_login("me");
        assert!(tracker.get_repo("me", "widgets").await.unwrap_err().is_not_found());

        tracker.create_fork("acme", "widgets").await.unwrap();
        assert!(tracker.get_repo("me", "widgets").await.is_ok());
        assert_eq!(tracker.forks(), vec![("acme".to_string(), "widgets".to_string())]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let tracker = MemoryTracker::new();
        tracker.add_issue("acme", "widgets", 1, "open", "One");
        tracker.fail_project("acme", "widgets");
        let err = tracker.get_issue("acme", "widgets", 1).await.unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(tracker.issue_calls(), 1);
    }
}
