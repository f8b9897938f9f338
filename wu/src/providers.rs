//! Capability registry: pluggable identity and dev-linking providers

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use workstore::ProjectRef;

use crate::config::{IdentityConfig, IdentityProviderKind};
use crate::error::WorkError;
use crate::git::GitFacade;
use crate::tasklog::TaskLog;

/// Supplies the initiator recorded on new units of work
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn initiator(&self) -> Result<String, WorkError>;
}

/// Identity from the global git `user.email`
pub struct GitIdentity {
    git: Arc<dyn GitFacade>,
}

impl GitIdentity {
    pub fn new(git: Arc<dyn GitFacade>) -> Self {
        Self { git }
    }
}

#[async_trait]
impl IdentityProvider for GitIdentity {
    async fn initiator(&self) -> Result<String, WorkError> {
        debug!("GitIdentity::initiator: called");
        self.git
            .author_email(None)
            .await
            .map_err(WorkError::git("Could not determine initiator; set git user.email"))
    }
}

/// Identity fixed by configuration
pub struct StaticIdentity {
    email: String,
}

impl StaticIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn initiator(&self) -> Result<String, WorkError> {
        Ok(self.email.clone())
    }
}

/// Links the working copies of related projects together for development
///
/// Called with every project across all open units after projects are added,
/// unless the caller opted out. This is an extension point: the binary ships
/// only [`NoopLinker`], and an embedding application supplies its own linker
/// through [`Providers::new`]. A failing linker is reported as a warning and
/// never fails the operation that triggered it.
#[async_trait]
pub trait DevLinker: Send + Sync {
    async fn link(&self, projects: &[ProjectRef], log: &mut TaskLog) -> Result<(), WorkError>;
}

/// Default linker: notes that linking was skipped
pub struct NoopLinker;

#[async_trait]
impl DevLinker for NoopLinker {
    async fn link(&self, projects: &[ProjectRef], log: &mut TaskLog) -> Result<(), WorkError> {
        debug!(count = projects.len(), "NoopLinker::link: called");
        log.info(format!(
            "No dev linker configured; skipped linking {} project(s).",
            projects.len()
        ));
        Ok(())
    }
}

/// The capabilities available to work operations
#[derive(Clone)]
pub struct Providers {
    pub identity: Arc<dyn IdentityProvider>,
    pub linker: Arc<dyn DevLinker>,
}

impl Providers {
    pub fn new(identity: Arc<dyn IdentityProvider>, linker: Arc<dyn DevLinker>) -> Self {
        Self { identity, linker }
    }

    pub fn from_config(config: &IdentityConfig, git: Arc<dyn GitFacade>) -> Result<Self, WorkError> {
        debug!(provider = ?config.provider, "Providers::from_config: called");
        let identity: Arc<dyn IdentityProvider> = match config.provider {
            IdentityProviderKind::Git => Arc::new(GitIdentity::new(git)),
            IdentityProviderKind::Static => {
                let email = config.email.clone().ok_or_else(|| {
                    WorkError::BadRequest("identity.provider is 'static' but identity.email is not set".to_string())
                })?;
                Arc::new(StaticIdentity::new(email))
            }
        };
        Ok(Self::new(identity, Arc::new(NoopLinker)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::memory::MemoryGit;

    #[tokio::test]
    async fn test_git_identity_uses_author_email() {
        let git = Arc::new(MemoryGit::new());
        git.set_email(Some("dev@acme.io"));
        let providers = Providers::from_config(&IdentityConfig::default(), git).unwrap();
        assert_eq!(providers.identity.initiator().await.unwrap(), "dev@acme.io");
    }

    #[tokio::test]
    async fn test_git_identity_without_email_fails() {
        let git = Arc::new(MemoryGit::new());
        git.set_email(None);
        let providers = Providers::from_config(&IdentityConfig::default(), git).unwrap();
        assert!(providers.identity.initiator().await.is_err());
    }

    #[test]
    fn test_static_identity_requires_email() {
        let config = IdentityConfig {
            provider: IdentityProviderKind::Static,
            email: None,
        };
        let result = Providers::from_config(&config, Arc::new(MemoryGit::new()));
        assert!(matches!(result, Err(WorkError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_noop_linker_logs_skip() {
        let mut log = TaskLog::new();
        NoopLinker
            .link(&[ProjectRef::new("acme", "widgets")], &mut log)
            .await
            .unwrap();
        assert_eq!(log.entries().len(), 1);
        assert!(!log.has_errors());
    }
}
