//! Workunit configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::expand_tilde;

/// Main workunit configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Root of the `<org>/<project>` working copies
    pub playground: PlaygroundConfig,

    /// Work store location and locking
    pub store: StoreConfig,

    /// Git subprocess configuration
    pub git: GitConfig,

    /// Issue tracker configuration
    pub tracker: TrackerConfig,

    /// Author identity for new units of work
    pub identity: IdentityConfig,
}

impl Config {
    /// Validate configuration for commands that talk to the tracker
    ///
    /// Checks that the token environment variable is set.
    pub fn validate(&self) -> Result<()> {
        if self.tracker.token().is_none() {
            return Err(eyre::eyre!(
                "Tracker token not found. Set the {} environment variable.",
                self.tracker.token_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .workunit.yml
        let local_config = PathBuf::from(".workunit.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/workunit/workunit.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("workunit").join("workunit.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Playground location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaygroundConfig {
    pub root: String,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            root: "~/playground".to_string(),
        }
    }
}

impl PlaygroundConfig {
    pub fn expanded(&self) -> PathBuf {
        expand_tilde(&self.root)
    }
}

/// Work store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the YAML store file
    pub path: String,

    /// How long to wait for the store lock
    #[serde(rename = "lock-timeout-ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/workunit on Linux)
        let path = dirs::data_local_dir()
            .map(|d| d.join("workunit").join("work-db.yaml"))
            .unwrap_or_else(|| PathBuf::from("work-db.yaml"))
            .to_string_lossy()
            .into_owned();

        Self {
            path,
            lock_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn expanded_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Git configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Remote name used for personal forks of public projects
    #[serde(rename = "fork-remote")]
    pub fork_remote: String,

    /// Timeout for each git subprocess in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            fork_remote: "workspace".to_string(),
            timeout_ms: 120_000,
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the API token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Page size for paginated listings
    #[serde(rename = "per-page")]
    pub per_page: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            timeout_ms: 30_000,
            per_page: 100,
        }
    }
}

impl TrackerConfig {
    /// Token from the configured environment variable, if set and non-empty
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.trim().is_empty())
    }
}

/// Which identity provider supplies the initiator of new work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProviderKind {
    #[default]
    Git,
    Static,
}

/// Identity configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub provider: IdentityProviderKind,

    /// Email used by the static provider
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.git.fork_remote, "workspace");
        assert_eq!(config.tracker.token_env, "GITHUB_TOKEN");
        assert_eq!(config.tracker.per_page, 100);
        assert_eq!(config.store.lock_timeout_ms, 5000);
        assert_eq!(config.identity.provider, IdentityProviderKind::Git);
        assert!(config.store.path.ends_with("work-db.yaml"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
playground: /src/playground
store:
  path: /tmp/db.yaml
  lock-timeout-ms: 100
git:
  fork-remote: fork
  timeout-ms: 1000
tracker:
  base-url: http://localhost:9000
  token-env: MY_TOKEN
  per-page: 10
identity:
  provider: static
  email: dev@acme.io
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.playground.expanded(), PathBuf::from("/src/playground"));
        assert_eq!(config.store.lock_timeout(), Duration::from_millis(100));
        assert_eq!(config.git.fork_remote, "fork");
        assert_eq!(config.tracker.base_url, "http://localhost:9000");
        assert_eq!(config.tracker.per_page, 10);
        assert_eq!(config.tracker.timeout_ms, 30_000);
        assert_eq!(config.identity.provider, IdentityProviderKind::Static);
        assert_eq!(config.identity.email.as_deref(), Some("dev@acme.io"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
git:
  fork-remote: mine
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.git.fork_remote, "mine");
        assert_eq!(config.git.timeout_ms, 120_000);
        assert_eq!(config.tracker.base_url, "https://api.github.com");
        assert_eq!(config.playground.root, "~/playground");
    }

    #[test]
    fn test_validate_requires_token() {
        let mut config = Config::default();
        config.tracker.token_env = "WORKUNIT_TEST_TOKEN_THAT_IS_NEVER_SET".to_string();
        assert!(config.validate().is_err());
    }
}
