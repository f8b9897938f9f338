//! Service-level error types

use thiserror::Error;
use workstore::StoreError;

use crate::git::GitError;
use crate::tracker::TrackerError;

/// Coarse classification used for reporting and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    External,
    Store,
}

/// Errors from work operations
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{context}: {source}")]
    Git {
        context: String,
        #[source]
        source: GitError,
    },

    #[error("{context}: {source}")]
    Tracker {
        context: String,
        #[source]
        source: TrackerError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkError {
    /// Wrap a git failure with what was being attempted and how to recover
    pub fn git(context: impl Into<String>) -> impl FnOnce(GitError) -> WorkError {
        let context = context.into();
        move |source| WorkError::Git { context, source }
    }

    /// Wrap a tracker failure with what was being requested
    pub fn tracker(context: impl Into<String>) -> impl FnOnce(TrackerError) -> WorkError {
        let context = context.into();
        move |source| WorkError::Tracker { context, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkError::NotFound(_) => ErrorKind::NotFound,
            WorkError::BadRequest(_) => ErrorKind::BadRequest,
            WorkError::Git {
                source: GitError::DirtyTree(_),
                ..
            } => ErrorKind::BadRequest,
            WorkError::Git { .. } => ErrorKind::External,
            WorkError::Tracker { source, .. } if source.is_not_found() => ErrorKind::NotFound,
            WorkError::Tracker { .. } => ErrorKind::External,
            WorkError::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            WorkError::Store(e) if e.is_bad_request() => ErrorKind::BadRequest,
            WorkError::Store(_) => ErrorKind::Store,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::BadRequest => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::External => 4,
            ErrorKind::Store => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kind_classification() {
        assert_eq!(WorkError::NotFound("x".to_string()).kind(), ErrorKind::NotFound);
        assert_eq!(
            WorkError::Store(StoreError::NotFound("k".to_string())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            WorkError::Store(StoreError::NotInWork {
                key: "k".to_string(),
                reference: "a/b/1".to_string()
            })
            .kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(WorkError::Store(StoreError::ReadOnly).kind(), ErrorKind::Store);

        let tracker_404 = WorkError::tracker("get issue")(TrackerError::NotFound("/repos/a/b/issues/1".to_string()));
        assert_eq!(tracker_404.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_git_context_in_message() {
        let err = WorkError::git("Failed to switch acme/widgets to main. You may need to commit or stash your work")(
            GitError::DirtyTree(PathBuf::from("/play/acme/widgets")),
        );
        let msg = err.to_string();
        assert!(msg.contains("commit or stash"));
        assert!(msg.contains("uncommitted changes"));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_exit_codes_distinct() {
        let codes = [
            WorkError::BadRequest(String::new()).exit_code(),
            WorkError::NotFound(String::new()).exit_code(),
            WorkError::git("x")(GitError::command_failed("/r", "fetch", "boom")).exit_code(),
            WorkError::Store(StoreError::ReadOnly).exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
    }
}
