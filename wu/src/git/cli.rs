//! Subprocess git implementation

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{GitError, GitFacade, Head, SyncStatus};
use crate::config::GitConfig;

const MAIN_CANDIDATES: [&str; 2] = ["main", "master"];

/// GitFacade backed by the `git` binary
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        debug!(?timeout, "GitCli::new: called");
        Self { timeout }
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self::new(Duration::from_millis(config.timeout_ms))
    }

    async fn output(&self, repo: Option<&Path>, args: &[&str]) -> Result<Output, GitError> {
        let operation = args.first().copied().unwrap_or_default().to_string();
        debug!(?repo, ?args, "GitCli::output: called");

        let mut cmd = Command::new("git");
        cmd.args(args).env("LC_ALL", "C").kill_on_drop(true);
        if let Some(repo) = repo {
            cmd.current_dir(repo);
        }

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                debug!(%operation, "GitCli::output: timed out");
                Err(GitError::Timeout {
                    operation,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Run git and return stdout, failing on non-zero exit
    async fn run(&self, repo: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = self.output(Some(repo), args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(?args, %stderr, "GitCli::run: failed");
            if refused_for_local_changes(&stderr) {
                return Err(GitError::DirtyTree(repo.to_path_buf()));
            }
            return Err(GitError::command_failed(repo, args.join(" "), stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run git where exit status 0/1 is the answer
    async fn probe(&self, repo: &Path, args: &[&str]) -> Result<bool, GitError> {
        let output = self.output(Some(repo), args).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::command_failed(
                repo,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim(),
            )),
        }
    }

    async fn ref_exists(&self, repo: &Path, full_ref: &str) -> Result<bool, GitError> {
        self.probe(repo, &["show-ref", "--verify", "--quiet", full_ref]).await
    }
}

#[async_trait]
impl GitFacade for GitCli {
    async fn origin_and_main(&self, repo: &Path) -> Result<(String, String), GitError> {
        debug!(repo = %repo.display(), "GitCli::origin_and_main: called");
        let remotes = self.run(repo, &["remote"]).await?;
        let remotes: Vec<&str> = remotes.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let origin = if remotes.contains(&"origin") {
            "origin".to_string()
        } else {
            remotes
                .first()
                .map(|r| r.to_string())
                .ok_or_else(|| GitError::UnexpectedOutput {
                    operation: "remote".to_string(),
                    output: "no remotes configured".to_string(),
                })?
        };

        // The remote's default branch wins over whatever main/master exists locally
        let head_ref = format!("refs/remotes/{}/HEAD", origin);
        let symbolic = self.output(Some(repo), &["symbolic-ref", "-q", "--short", &head_ref]).await?;
        if symbolic.status.success() {
            let symbolic = String::from_utf8_lossy(&symbolic.stdout);
            if let Some(main) = symbolic.trim().strip_prefix(&format!("{}/", origin)) {
                return Ok((origin, main.to_string()));
            }
        }

        for candidate in MAIN_CANDIDATES {
            if self.ref_exists(repo, &format!("refs/heads/{}", candidate)).await? {
                return Ok((origin, candidate.to_string()));
            }
        }

        Err(GitError::UnexpectedOutput {
            operation: "symbolic-ref".to_string(),
            output: format!("{} is not set and no main or master branch exists", head_ref),
        })
    }

    async fn head(&self, repo: &Path) -> Result<Head, GitError> {
        debug!(repo = %repo.display(), "GitCli::head: called");
        let output = self.output(Some(repo), &["symbolic-ref", "-q", "--short", "HEAD"]).await?;
        match output.status.code() {
            Some(0) => Ok(Head::Branch(String::from_utf8_lossy(&output.stdout).trim().to_string())),
            Some(1) => {
                let commit = self.run(repo, &["rev-parse", "HEAD"]).await?;
                Ok(Head::Detached(commit.trim().to_string()))
            }
            _ => Err(GitError::command_failed(
                repo,
                "symbolic-ref HEAD",
                String::from_utf8_lossy(&output.stderr).trim(),
            )),
        }
    }

    async fn has_local_branch(&self, repo: &Path, branch: &str) -> Result<bool, GitError> {
        self.ref_exists(repo, &format!("refs/heads/{}", branch)).await
    }

    async fn has_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> Result<bool, GitError> {
        self.ref_exists(repo, &format!("refs/remotes/{}/{}", remote, branch)).await
    }

    async fn fetch(&self, repo: &Path, remote: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %remote, "GitCli::fetch: called");
        self.run(repo, &["fetch", remote]).await.map(|_| ())
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %branch, "GitCli::checkout: called");
        self.run(repo, &["checkout", branch]).await.map(|_| ())
    }

    async fn checkout_detached(&self, repo: &Path, commit: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %commit, "GitCli::checkout_detached: called");
        self.run(repo, &["checkout", "--detach", commit]).await.map(|_| ())
    }

    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %branch, "GitCli::create_branch: called");
        self.run(repo, &["checkout", "-b", branch]).await.map(|_| ())
    }

    async fn track_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %remote, %branch, "GitCli::track_remote_branch: called");
        self.run(repo, &["fetch", remote, branch]).await?;
        let upstream = format!("{}/{}", remote, branch);
        self.run(repo, &["checkout", "-b", branch, "--track", &upstream])
            .await
            .map(|_| ())
    }

    async fn merge(&self, repo: &Path, source: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %source, "GitCli::merge: called");
        self.run(repo, &["merge", "--no-edit", source]).await.map(|_| ())
    }

    async fn push_set_upstream(&self, repo: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %remote, %branch, "GitCli::push_set_upstream: called");
        self.run(repo, &["push", "--set-upstream", remote, branch]).await.map(|_| ())
    }

    async fn is_clean(&self, repo: &Path) -> Result<bool, GitError> {
        let out = self.run(repo, &["status", "--porcelain", "--untracked-files=no"]).await?;
        Ok(out.trim().is_empty())
    }

    async fn contains(&self, repo: &Path, commit: &str, target: &str) -> Result<bool, GitError> {
        debug!(repo = %repo.display(), %commit, %target, "GitCli::contains: called");
        self.probe(repo, &["merge-base", "--is-ancestor", commit, target]).await
    }

    async fn compare(&self, repo: &Path, branch: &str, remote: &str) -> Result<SyncStatus, GitError> {
        debug!(repo = %repo.display(), %branch, %remote, "GitCli::compare: called");
        let range = format!("{}...{}/{}", branch, remote, branch);
        let out = self.run(repo, &["rev-list", "--left-right", "--count", &range]).await?;
        parse_left_right(&out)
    }

    async fn delete_branch(&self, repo: &Path, branch: &str, force: bool) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %branch, %force, "GitCli::delete_branch: called");
        let flag = if force { "-D" } else { "-d" };
        self.run(repo, &["branch", flag, branch]).await.map(|_| ())
    }

    async fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>, GitError> {
        let output = self.output(Some(repo), &["remote", "get-url", remote]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    async fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> Result<(), GitError> {
        debug!(repo = %repo.display(), %remote, %url, "GitCli::add_remote: called");
        self.run(repo, &["remote", "add", remote, url]).await.map(|_| ())
    }

    async fn author_email(&self, repo: Option<&Path>) -> Result<String, GitError> {
        let output = self.output(repo, &["config", "user.email"]).await?;
        let email = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || email.is_empty() {
            return Err(GitError::UnexpectedOutput {
                operation: "config user.email".to_string(),
                output: "user.email is not set".to_string(),
            });
        }
        Ok(email)
    }
}

/// Whether git refused to switch or merge because of uncommitted changes
fn refused_for_local_changes(stderr: &str) -> bool {
    stderr.contains("would be overwritten by") || stderr.contains("Please commit your changes or stash them")
}

fn parse_left_right(out: &str) -> Result<SyncStatus, GitError> {
    let counts: Vec<usize> = out
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| GitError::UnexpectedOutput {
            operation: "rev-list".to_string(),
            output: out.to_string(),
        })?;
    match counts.as_slice() {
        [local_only, remote_only] => Ok(SyncStatus::from_counts(*local_only, *remote_only)),
        _ => Err(GitError::UnexpectedOutput {
            operation: "rev-list".to_string(),
            output: out.to_string(),
        }),
    }
}
