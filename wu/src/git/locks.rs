//! Per-repository serialization

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// One async mutex per repository path
///
/// Git operations within a working copy must not interleave; holders of
/// the guard for a path run their git sequence alone.
#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the repository at `path`
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        debug!(path = %path.display(), "RepoLocks::lock: called");
        let mutex = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_serializes() {
        let locks = RepoLocks::new();
        let path = PathBuf::from("/play/acme/widgets");

        let guard = locks.lock(&path).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(&path)).await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), locks.lock(&path)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_different_paths_independent() {
        let locks = RepoLocks::new();
        let _a = locks.lock(Path::new("/play/a/one")).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(Path::new("/play/a/two"))).await;
        assert!(b.is_ok());
    }
}
