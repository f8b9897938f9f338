//! Store error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while reading, locking, or mutating the work store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No such unit of work '{0}'")]
    NotFound(String),

    #[error("Unit of work '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("'{reference}' is not part of unit of work '{key}'")]
    NotInWork { key: String, reference: String },

    #[error("Work store was opened read-only")]
    ReadOnly,

    #[error("Timed out after {waited:?} waiting for store lock at {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Corrupt work store at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize work store: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Check if this error means a requested record or reference is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Check if this error was caused by the caller's input rather than the store itself
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists(_) | StoreError::InvalidReference { .. } | StoreError::NotInWork { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(StoreError::NotFound("work-a/b/1".to_string()).is_not_found());
        assert!(!StoreError::ReadOnly.is_not_found());
    }

    #[test]
    fn test_is_bad_request() {
        let err = StoreError::NotInWork {
            key: "work-a/b/1".to_string(),
            reference: "a/b/2".to_string(),
        };
        assert!(err.is_bad_request());
        assert!(err.to_string().contains("a/b/2"));
        assert!(!StoreError::NotFound("x".to_string()).is_bad_request());
    }
}
