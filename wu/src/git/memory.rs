//! In-memory GitFacade for tests
//!
//! Each repository is modelled as sets of commit ids per branch. A branch
//! contains another when its commit set is a superset; that is enough to
//! express merges, ahead/behind and fast-forwards without a real DAG.
//!
//! Remote state lives on a simulated server per remote. `fetch` copies the
//! server's branches into remote-tracking refs, so tests can change the
//! server and observe the difference between fetching and not fetching.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::{GitError, GitFacade, Head, SyncStatus};

type Commits = BTreeSet<u64>;

#[derive(Debug, Default, Clone)]
struct Repo {
    remotes: BTreeMap<String, String>,
    local: BTreeMap<String, Commits>,
    /// `<remote>/<branch>` as last fetched
    tracking: BTreeMap<String, Commits>,
    /// remote name -> branch -> commits, the "server" side
    server: BTreeMap<String, BTreeMap<String, Commits>>,
    /// Default branch advertised by `origin`
    remote_head: Option<String>,
    /// Commit ids that HEAD has been detached at
    detached_commits: BTreeMap<String, Commits>,
    current: String,
    detached: Option<String>,
    dirty: bool,
}

#[derive(Debug, Default)]
struct State {
    repos: BTreeMap<PathBuf, Repo>,
    next_commit: u64,
    failures: HashSet<(PathBuf, String)>,
    ops: Vec<(PathBuf, String)>,
    email: Option<String>,
}

/// In-memory repositories keyed by path
#[derive(Debug)]
pub struct MemoryGit {
    state: Mutex<State>,
}

impl Default for MemoryGit {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGit {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_commit: 1,
                email: Some("dev@example.com".to_string()),
                ..Default::default()
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Add a repository with `origin` and a single commit on `main`, pushed and fetched
    pub fn add_repo(&self, path: impl Into<PathBuf>, main: &str) {
        let path = path.into();
        debug!(path = %path.display(), %main, "MemoryGit::add_repo: called");
        self.with_state(|state| {
            let base = state.next_commit;
            state.next_commit += 1;
            let commits: Commits = [base].into_iter().collect();

            let mut repo = Repo {
                current: main.to_string(),
                remote_head: Some(main.to_string()),
                ..Default::default()
            };
            repo.remotes
                .insert("origin".to_string(), format!("git@github.com:origin/{}.git", path.display()));
            repo.local.insert(main.to_string(), commits.clone());
            repo.tracking.insert(format!("origin/{}", main), commits.clone());
            repo.server
                .entry("origin".to_string())
                .or_default()
                .insert(main.to_string(), commits);
            state.repos.insert(path, repo);
        });
    }

    /// Point `origin/HEAD` at `branch`, or unset it
    pub fn set_remote_head(&self, path: &Path, branch: Option<&str>) {
        self.with_state(|state| {
            if let Some(repo) = state.repos.get_mut(path) {
                repo.remote_head = branch.map(str::to_string);
            }
        });
    }

    /// Detach HEAD at the tip of the current branch, returning the commit id
    pub fn detach(&self, path: &Path) -> Option<String> {
        self.with_state(|state| {
            let id = state.next_commit;
            state.next_commit += 1;
            let repo = state.repos.get_mut(path)?;
            let commit = format!("{:040x}", id);
            let commits = repo.head_commits();
            repo.detached_commits.insert(commit.clone(), commits);
            repo.detached = Some(commit.clone());
            Some(commit)
        })
    }

    pub fn set_email(&self, email: Option<&str>) {
        self.with_state(|state| state.email = email.map(str::to_string));
    }

    /// Add a new commit on a local branch, returning its id
    pub fn commit(&self, path: &Path, branch: &str) -> u64 {
        self.with_state(|state| {
            let id = state.next_commit;
            state.next_commit += 1;
            if let Some(repo) = state.repos.get_mut(path) {
                repo.local.entry(branch.to_string()).or_default().insert(id);
            }
            id
        })
    }

    /// Create a local branch from `from` without switching to it
    pub fn branch_from(&self, path: &Path, branch: &str, from: &str) {
        self.with_state(|state| {
            if let Some(repo) = state.repos.get_mut(path) {
                let commits = repo.local.get(from).cloned().unwrap_or_default();
                repo.local.insert(branch.to_string(), commits);
            }
        });
    }

    /// Set a branch on the simulated server of `remote`
    pub fn set_server_branch(&self, path: &Path, remote: &str, branch: &str, commits: &[u64]) {
        self.with_state(|state| {
            if let Some(repo) = state.repos.get_mut(path) {
                repo.server
                    .entry(remote.to_string())
                    .or_default()
                    .insert(branch.to_string(), commits.iter().copied().collect());
            }
        });
    }

    /// Simulate merging a pull request: server `<remote>/<branch>` lands in `origin/<main>`
    pub fn merge_on_server(&self, path: &Path, remote: &str, branch: &str, main: &str) {
        self.with_state(|state| {
            if let Some(repo) = state.repos.get_mut(path) {
                let head = repo
                    .server
                    .get(remote)
                    .and_then(|b| b.get(branch))
                    .cloned()
                    .unwrap_or_default();
                repo.server
                    .entry("origin".to_string())
                    .or_default()
                    .entry(main.to_string())
                    .or_default()
                    .extend(head);
            }
        });
    }

    pub fn add_remote_url(&self, path: &Path, remote: &str, url: &str) {
        self.with_state(|state| {
            if let Some(repo) = state.repos.get_mut(path) {
                repo.remotes.insert(remote.to_string(), url.to_string());
            }
        });
    }

    pub fn set_dirty(&self, path: &Path, dirty: bool) {
        self.with_state(|state| {
            if let Some(repo) = state.repos.get_mut(path) {
                repo.dirty = dirty;
            }
        });
    }

    /// Make the named operation (e.g. "fetch", "checkout") fail in `path`
    pub fn fail_on(&self, path: &Path, operation: &str) {
        self.with_state(|state| {
            state.failures.insert((path.to_path_buf(), operation.to_string()));
        });
    }

    pub fn clear_failures(&self) {
        self.with_state(|state| state.failures.clear());
    }

    /// Current branch, or the commit id when detached
    pub fn current(&self, path: &Path) -> Option<String> {
        self.with_state(|state| state.repos.get(path).map(|r| r.head().name().to_string()))
    }

    pub fn local_branches(&self, path: &Path) -> Vec<String> {
        self.with_state(|state| {
            state
                .repos
                .get(path)
                .map(|r| r.local.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    pub fn server_has_branch(&self, path: &Path, remote: &str, branch: &str) -> bool {
        self.with_state(|state| {
            state
                .repos
                .get(path)
                .and_then(|r| r.server.get(remote))
                .is_some_and(|b| b.contains_key(branch))
        })
    }

    pub fn remote_names(&self, path: &Path) -> Vec<String> {
        self.with_state(|state| {
            state
                .repos
                .get(path)
                .map(|r| r.remotes.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Operations performed in `path`, as "<op> <args>"
    pub fn ops(&self, path: &Path) -> Vec<String> {
        self.with_state(|state| {
            state
                .ops
                .iter()
                .filter(|(p, _)| p == path)
                .map(|(_, op)| op.clone())
                .collect()
        })
    }

    /// Operations that change repository state
    pub fn mutating_ops(&self, path: &Path) -> Vec<String> {
        const READ_ONLY: [&str; 8] = [
            "origin_and_main",
            "head",
            "has_local_branch",
            "has_remote_branch",
            "is_clean",
            "contains",
            "compare",
            "remote_url",
        ];
        self.ops(path)
            .into_iter()
            .filter(|op| {
                let name = op.split_whitespace().next().unwrap_or_default();
                !READ_ONLY.contains(&name)
            })
            .collect()
    }

    /// Record the op, check injected failures, and run `f` on the repo
    fn op<T>(
        &self,
        path: &Path,
        op: &str,
        detail: &str,
        f: impl FnOnce(&mut Repo) -> Result<T, GitError>,
    ) -> Result<T, GitError> {
        self.with_state(|state| {
            let entry = if detail.is_empty() {
                op.to_string()
            } else {
                format!("{} {}", op, detail)
            };
            state.ops.push((path.to_path_buf(), entry));

            if state.failures.contains(&(path.to_path_buf(), op.to_string())) {
                return Err(GitError::command_failed(path, op, "injected failure"));
            }
            let repo = state
                .repos
                .get_mut(path)
                .ok_or_else(|| GitError::command_failed(path, op, "not a git repository"))?;
            f(repo)
        })
    }
}

impl Repo {
    fn head(&self) -> Head {
        match &self.detached {
            Some(commit) => Head::Detached(commit.clone()),
            None => Head::Branch(self.current.clone()),
        }
    }

    fn head_commits(&self) -> Commits {
        match &self.detached {
            Some(commit) => self.detached_commits.get(commit).cloned().unwrap_or_default(),
            None => self.local.get(&self.current).cloned().unwrap_or_default(),
        }
    }

    fn resolve(&self, name: &str) -> Option<&Commits> {
        self.local.get(name).or_else(|| self.tracking.get(name))
    }

    fn require(&self, path: &Path, op: &str, name: &str) -> Result<Commits, GitError> {
        self.resolve(name)
            .cloned()
            .ok_or_else(|| GitError::command_failed(path, op, format!("unknown revision '{}'", name)))
    }

    fn ensure_clean(&self, path: &Path) -> Result<(), GitError> {
        if self.dirty {
            return Err(GitError::DirtyTree(path.to_path_buf()));
        }
        Ok(())
    }
}

#[async_trait]
impl GitFacade for MemoryGit {
    async fn origin_and_main(&self, repo: &Path) -> Result<(String, String), GitError> {
        self.op(repo, "origin_and_main", "", |r| {
            let origin = if r.remotes.contains_key("origin") {
                "origin".to_string()
            } else {
                r.remotes.keys().next().cloned().ok_or_else(|| GitError::UnexpectedOutput {
                    operation: "remote".to_string(),
                    output: "no remotes configured".to_string(),
                })?
            };
            let main = match &r.remote_head {
                Some(head) => head.clone(),
                None => ["main", "master"]
                    .into_iter()
                    .find(|m| r.local.contains_key(*m))
                    .map(str::to_string)
                    .ok_or_else(|| GitError::UnexpectedOutput {
                        operation: "symbolic-ref".to_string(),
                        output: "no main branch".to_string(),
                    })?,
            };
            Ok((origin, main))
        })
    }

    async fn head(&self, repo: &Path) -> Result<Head, GitError> {
        self.op(repo, "head", "", |r| Ok(r.head()))
    }

    async fn has_local_branch(&self, repo: &Path, branch: &str) -> Result<bool, GitError> {
        self.op(repo, "has_local_branch", branch, |r| Ok(r.local.contains_key(branch)))
    }

    async fn has_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> Result<bool, GitError> {
        let name = format!("{}/{}", remote, branch);
        self.op(repo, "has_remote_branch", &name, |r| Ok(r.tracking.contains_key(&name)))
    }

    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), GitError> {
        self.op(repo, "fetch", remote, |r| {
            if !r.remotes.contains_key(remote) {
                return Err(GitError::command_failed(repo, "fetch", format!("no such remote '{}'", remote)));
            }
            let branches = r.server.get(remote).cloned().unwrap_or_default();
            r.tracking.retain(|name, _| !name.starts_with(&format!("{}/", remote)));
            for (branch, commits) in branches {
                r.tracking.insert(format!("{}/{}", remote, branch), commits);
            }
            Ok(())
        })
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.op(repo, "checkout", branch, |r| {
            r.ensure_clean(repo)?;
            if !r.local.contains_key(branch) {
                return Err(GitError::command_failed(
                    repo,
                    "checkout",
                    format!("pathspec '{}' did not match", branch),
                ));
            }
            r.current = branch.to_string();
            r.detached = None;
            Ok(())
        })
    }

    async fn checkout_detached(&self, repo: &Path, commit: &str) -> Result<(), GitError> {
        self.op(repo, "checkout_detached", commit, |r| {
            r.ensure_clean(repo)?;
            if !r.detached_commits.contains_key(commit) {
                return Err(GitError::command_failed(
                    repo,
                    "checkout --detach",
                    format!("unknown revision '{}'", commit),
                ));
            }
            r.detached = Some(commit.to_string());
            Ok(())
        })
    }

    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.op(repo, "create_branch", branch, |r| {
            if r.local.contains_key(branch) {
                return Err(GitError::command_failed(repo, "checkout -b", "branch already exists"));
            }
            let commits = r.head_commits();
            r.local.insert(branch.to_string(), commits);
            r.current = branch.to_string();
            r.detached = None;
            Ok(())
        })
    }

    async fn track_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        let detail = format!("{}/{}", remote, branch);
        self.op(repo, "track_remote_branch", &detail, |r| {
            r.ensure_clean(repo)?;
            let commits = r
                .server
                .get(remote)
                .and_then(|b| b.get(branch))
                .cloned()
                .ok_or_else(|| GitError::command_failed(repo, "fetch", format!("couldn't find remote ref {}", branch)))?;
            r.tracking.insert(detail.clone(), commits.clone());
            r.local.insert(branch.to_string(), commits);
            r.current = branch.to_string();
            r.detached = None;
            Ok(())
        })
    }

    async fn merge(&self, repo: &Path, source: &str) -> Result<(), GitError> {
        self.op(repo, "merge", source, |r| {
            r.ensure_clean(repo)?;
            let incoming = r.require(repo, "merge", source)?;
            match r.detached.clone() {
                Some(commit) => r.detached_commits.entry(commit).or_default().extend(incoming),
                None => {
                    let current = r.current.clone();
                    r.local.entry(current).or_default().extend(incoming)
                }
            }
            Ok(())
        })
    }

    async fn push_set_upstream(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        let detail = format!("{} {}", remote, branch);
        self.op(repo, "push", &detail, |r| {
            let commits = r.local.get(branch).cloned().ok_or_else(|| {
                GitError::command_failed(repo, "push", format!("src refspec {} does not match any", branch))
            })?;
            if !r.remotes.contains_key(remote) {
                return Err(GitError::command_failed(repo, "push", format!("no such remote '{}'", remote)));
            }
            r.server
                .entry(remote.to_string())
                .or_default()
                .entry(branch.to_string())
                .or_default()
                .extend(commits.iter().copied());
            r.tracking.insert(format!("{}/{}", remote, branch), commits);
            Ok(())
        })
    }

    async fn is_clean(&self, repo: &Path) -> Result<bool, GitError> {
        self.op(repo, "is_clean", "", |r| Ok(!r.dirty))
    }

    async fn contains(&self, repo: &Path, commit: &str, target: &str) -> Result<bool, GitError> {
        let detail = format!("{} {}", commit, target);
        self.op(repo, "contains", &detail, |r| {
            let tip = r.require(repo, "contains", commit)?;
            let target = r.require(repo, "contains", target)?;
            Ok(tip.is_subset(&target))
        })
    }

    async fn compare(&self, repo: &Path, branch: &str, remote: &str) -> Result<SyncStatus, GitError> {
        let upstream = format!("{}/{}", remote, branch);
        self.op(repo, "compare", &upstream, |r| {
            let local = r.require(repo, "compare", branch)?;
            let remote = r.require(repo, "compare", &upstream)?;
            Ok(SyncStatus::from_counts(
                local.difference(&remote).count(),
                remote.difference(&local).count(),
            ))
        })
    }

    async fn delete_branch(&self, repo: &Path, branch: &str, force: bool) -> Result<(), GitError> {
        self.op(repo, "delete_branch", branch, |r| {
            if r.head() == Head::Branch(branch.to_string()) {
                return Err(GitError::command_failed(
                    repo,
                    "branch -d",
                    format!("cannot delete branch '{}' checked out", branch),
                ));
            }
            let commits = r.require(repo, "branch -d", branch)?;
            if !force {
                let head = r.head_commits();
                let suffix = format!("/{}", branch);
                let merged_upstream = r
                    .tracking
                    .iter()
                    .any(|(name, c)| name.ends_with(&suffix) && commits.is_subset(c));
                if !commits.is_subset(&head) && !merged_upstream {
                    return Err(GitError::command_failed(
                        repo,
                        "branch -d",
                        format!("the branch '{}' is not fully merged", branch),
                    ));
                }
            }
            r.local.remove(branch);
            Ok(())
        })
    }

    async fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>, GitError> {
        self.op(repo, "remote_url", remote, |r| Ok(r.remotes.get(remote).cloned()))
    }

    async fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> Result<(), GitError> {
        let detail = format!("{} {}", remote, url);
        self.op(repo, "add_remote", &detail, |r| {
            if r.remotes.contains_key(remote) {
                return Err(GitError::command_failed(
                    repo,
                    "remote add",
                    format!("remote {} already exists", remote),
                ));
            }
            r.remotes.insert(remote.to_string(), url.to_string());
            Ok(())
        })
    }

    async fn author_email(&self, _repo: Option<&Path>) -> Result<String, GitError> {
        self.with_state(|state| state.email.clone()).ok_or_else(|| GitError::UnexpectedOutput {
            operation: "config user.email".to_string(),
            output: "user.email is not set".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (MemoryGit, PathBuf) {
        let git = MemoryGit::new();
        let path = PathBuf::from("/play/acme/widgets");
        git.add_repo(&path, "main");
        (git, path)
    }

    #[tokio::test]
    async fn test_fetch_reveals_server_changes() {
        let (git, path) = repo();
        git.set_server_branch(&path, "origin", "feature", &[1, 99]);
        assert!(!git.has_remote_branch(&path, "origin", "feature").await.unwrap());

        git.fetch(&path, "origin").await.unwrap();
        assert!(git.has_remote_branch(&path, "origin", "feature").await.unwrap());
    }

    #[tokio::test]
    async fn test_merge_and_containment() {
        let (git, path) = repo();
        git.create_branch(&path, "work").await.unwrap();
        git.commit(&path, "work");
        assert!(!git.contains(&path, "work", "main").await.unwrap());

        git.checkout(&path, "main").await.unwrap();
        git.merge(&path, "work").await.unwrap();
        assert!(git.contains(&path, "work", "main").await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_after_local_commit() {
        let (git, path) = repo();
        git.create_branch(&path, "work").await.unwrap();
        git.push_set_upstream(&path, "origin", "work").await.unwrap();
        assert_eq!(git.compare(&path, "work", "origin").await.unwrap(), SyncStatus::InSync);

        git.commit(&path, "work");
        assert_eq!(git.compare(&path, "work", "origin").await.unwrap(), SyncStatus::LocalAhead);
    }

    #[tokio::test]
    async fn test_dirty_tree_blocks_checkout() {
        let (git, path) = repo();
        git.branch_from(&path, "work", "main");
        git.set_dirty(&path, true);
        assert!(matches!(
            git.checkout(&path, "work").await,
            Err(GitError::DirtyTree(_))
        ));
    }

    #[tokio::test]
    async fn test_detached_head_round_trip() {
        let (git, path) = repo();
        let commit = git.detach(&path).unwrap();
        assert_eq!(git.head(&path).await.unwrap(), Head::Detached(commit.clone()));
        assert_eq!(git.current_branch(&path).await.unwrap(), commit);

        git.checkout(&path, "main").await.unwrap();
        assert_eq!(git.head(&path).await.unwrap(), Head::Branch("main".to_string()));
        git.checkout_detached(&path, &commit).await.unwrap();
        assert_eq!(git.current(&path), Some(commit));
    }

    #[tokio::test]
    async fn test_remote_head_preferred_for_main() {
        let (git, path) = repo();
        git.branch_from(&path, "develop", "main");
        git.set_remote_head(&path, Some("develop"));
        assert_eq!(git.origin_and_main(&path).await.unwrap().1, "develop");

        git.set_remote_head(&path, None);
        assert_eq!(git.origin_and_main(&path).await.unwrap().1, "main");
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let (git, path) = repo();
        git.fail_on(&path, "fetch");
        assert!(git.fetch(&path, "origin").await.is_err());
        assert_eq!(git.ops(&path), vec!["fetch origin".to_string()]);
    }
}
