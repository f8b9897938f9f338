//! Opening the work store from async code

use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use workstore::{LockMode, StoreError, WorkStore};

use crate::error::WorkError;

/// Open the store on the blocking pool
///
/// Acquiring the store lock polls with thread sleeps until `lock_timeout`,
/// so it must not run on an async worker.
pub async fn open_store(path: PathBuf, mode: LockMode, lock_timeout: Duration) -> Result<WorkStore, WorkError> {
    debug!(path = %path.display(), ?mode, "open_store: called");
    let opened = tokio::task::spawn_blocking(move || WorkStore::open(&path, mode, lock_timeout))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
    Ok(opened?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test(flavor = "current_thread")]
    async fn test_lock_wait_leaves_runtime_responsive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("work-db.yaml");
        let _held = WorkStore::open(&path, LockMode::Exclusive, Duration::from_secs(1)).unwrap();

        let ticker = tokio::spawn(async {
            let mut ticks = 0;
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ticks += 1;
            }
            ticks
        });

        let started = std::time::Instant::now();
        let result = open_store(path, LockMode::Exclusive, Duration::from_millis(400)).await;
        assert!(matches!(result, Err(WorkError::Store(StoreError::LockTimeout { .. }))));
        assert!(ticker.is_finished(), "ticker starved for {:?}", started.elapsed());
        assert_eq!(ticker.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_open_creates_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = open_store(dir.path().join("work-db.yaml"), LockMode::Shared, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(store.keys().is_empty());
    }
}
