//! GitHub REST implementation of TrackerFacade

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{Issue, PullRequest, PullRequestQuery, RepoInfo, TrackerError, TrackerFacade};
use crate::config::TrackerConfig;

const USER_AGENT: &str = concat!("workunit/", env!("CARGO_PKG_VERSION"));

/// Largest page the REST API honours; larger requests are silently capped
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

/// GitHub client
///
/// Repository metadata and the authenticated login are cached for the
/// lifetime of the client. Issues, pull requests and branches are always
/// fetched fresh.
pub struct GitHubTracker {
    http: Client,
    base_url: String,
    token: Option<String>,
    per_page: u32,
    repos: Mutex<HashMap<String, RepoInfo>>,
    login: OnceCell<String>,
}

impl GitHubTracker {
    /// Create a client from configuration, reading the token from the environment
    ///
    /// A missing token is not an error here; unauthenticated requests are
    /// sent and the host decides. `Config::validate` is where commands that
    /// need a token fail early.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, TrackerError> {
        debug!(base_url = %config.base_url, "GitHubTracker::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(USER_AGENT)
            .build()
            .map_err(TrackerError::Network)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token(),
            per_page: config.per_page.clamp(1, MAX_PER_PAGE),
            repos: Mutex::new(HashMap::new()),
            login: OnceCell::new(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, builder: RequestBuilder) -> Result<T, TrackerError> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(%path, "GitHubTracker::send: not found");
            return Err(TrackerError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(%path, %status, "GitHubTracker::send: API error");
            return Err(TrackerError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TrackerError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TrackerError> {
        self.send(path, self.request(reqwest::Method::GET, path)).await
    }
}

#[async_trait]
impl TrackerFacade for GitHubTracker {
    async fn get_issue(&self, owner: &str, project: &str, number: u64) -> Result<Issue, TrackerError> {
        debug!(%owner, %project, %number, "GitHubTracker::get_issue: called");
        self.get(&format!("/repos/{}/{}/issues/{}", owner, project, number)).await
    }

    async fn list_pull_requests(
        &self,
        owner: &str,
        project: &str,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequest>, TrackerError> {
        debug!(%owner, %project, head = %query.head, "GitHubTracker::list_pull_requests: called");
        let path = format!("/repos/{}/{}/pulls", owner, project);
        let per_page = self.per_page.to_string();
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let page_str = page.to_string();
            let builder = self.request(reqwest::Method::GET, &path).query(&[
                ("head", query.head.as_str()),
                ("state", "all"),
                ("per_page", per_page.as_str()),
                ("page", page_str.as_str()),
            ]);
            let batch: Vec<PullRequest> = self.send(&path, builder).await?;
            let short = batch.len() < self.per_page as usize;
            all.extend(batch);
            if short {
                break;
            }
            page += 1;
        }

        debug!(count = all.len(), pages = page, "GitHubTracker::list_pull_requests: done");
        Ok(all)
    }

    async fn get_repo(&self, owner: &str, project: &str) -> Result<RepoInfo, TrackerError> {
        let key = format!("{}/{}", owner, project);
        if let Some(cached) = self.repos.lock().ok().and_then(|c| c.get(&key).cloned()) {
            debug!(%key, "GitHubTracker::get_repo: cache hit");
            return Ok(cached);
        }

        debug!(%key, "GitHubTracker::get_repo: fetching");
        let info: RepoInfo = self.get(&format!("/repos/{}", key)).await?;
        if let Ok(mut cache) = self.repos.lock() {
            cache.insert(key, info.clone());
        }
        Ok(info)
    }

    async fn branch_exists(&self, owner: &str, project: &str, branch: &str) -> Result<bool, TrackerError> {
        debug!(%owner, %project, %branch, "GitHubTracker::branch_exists: called");
        let path = format!("/repos/{}/{}/branches/{}", owner, project, branch);
        match self.get::<serde_json::Value>(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn current_login(&self) -> Result<String, TrackerError> {
        let login = self
            .login
            .get_or_try_init(|| async {
                debug!("GitHubTracker::current_login: fetching");
                let user: User = self.get("/user").await?;
                Ok::<_, TrackerError>(user.login)
            })
            .await?;
        Ok(login.clone())
    }

    async fn create_fork(&self, owner: &str, project: &str) -> Result<(), TrackerError> {
        debug!(%owner, %project, "GitHubTracker::create_fork: called");
        let path = format!("/repos/{}/{}/forks", owner, project);
        let builder = self
            .request(reqwest::Method::POST, &path)
            .json(&serde_json::json!({ "default_branch_only": true }));
        let _: serde_json::Value = self.send(&path, builder).await?;
        info!("Requested fork of {}/{}", owner, project);
        Ok(())
    }
}
