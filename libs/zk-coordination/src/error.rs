//! Error types for coordination operations.
//!
//! Every store outcome is folded into a handful of typed variants so callers
//! can tell a bad argument from a deleted path from an unreachable store
//! without knowing the store's own result codes.

use std::path::PathBuf;

use thiserror::Error;

use crate::handle::StoreError;

/// Top-level error type for the zk-coordination crate.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The caller passed an empty or malformed argument. Never retried, the
    /// store is not contacted.
    #[error("invalid parameter: {0}")]
    Param(String),

    /// The target path does not exist.
    #[error("node does not exist: {path}")]
    NotFound { path: String },

    /// The store was reached but returned an unrecoverable error, or kept
    /// returning transient errors until the retry bound was hit.
    #[error("{op} failed for {path} after {attempts} attempt(s): {source}")]
    RemoteFailure {
        op: &'static str,
        path: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// Data read from the store violates a domain constraint.
    #[error("invariant violation at {path}: {detail}")]
    InvariantViolation { path: String, detail: String },

    /// A child's status could not be resolved, so the whole aggregation was
    /// abandoned.
    #[error("failed to resolve service status of {path}: {source}")]
    ChildStatus {
        path: String,
        #[source]
        source: Box<CoordinationError>,
    },

    /// The diagnostics log file could not be opened.
    #[error("failed to open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome buckets every error collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Param,
    NotFound,
    RemoteFailure,
    InvariantViolation,
    FileOpen,
}

impl CoordinationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinationError::Param(_) => ErrorKind::Param,
            CoordinationError::NotFound { .. } => ErrorKind::NotFound,
            CoordinationError::RemoteFailure { .. } | CoordinationError::ChildStatus { .. } => {
                ErrorKind::RemoteFailure
            }
            CoordinationError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            CoordinationError::LogFile { .. } => ErrorKind::FileOpen,
        }
    }

    /// Returns true if the addressed node was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordinationError::NotFound { .. })
    }

    /// Returns true if the caller's arguments were rejected.
    pub fn is_param(&self) -> bool {
        matches!(self, CoordinationError::Param(_))
    }

    pub(crate) fn param(msg: impl Into<String>) -> Self {
        CoordinationError::Param(msg.into())
    }
}

/// Shorthand result alias for coordination operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(
            CoordinationError::param("empty path").kind(),
            ErrorKind::Param
        );
        assert_eq!(
            CoordinationError::NotFound { path: "/a".into() }.kind(),
            ErrorKind::NotFound
        );
        let remote = CoordinationError::RemoteFailure {
            op: "get_data",
            path: "/a".into(),
            attempts: 3,
            source: StoreError::InvalidState,
        };
        assert_eq!(remote.kind(), ErrorKind::RemoteFailure);

        let child = CoordinationError::ChildStatus {
            path: "/svc/a".into(),
            source: Box::new(CoordinationError::InvariantViolation {
                path: "/svc/a".into(),
                detail: "status 99".into(),
            }),
        };
        assert_eq!(child.kind(), ErrorKind::RemoteFailure);

        let file = CoordinationError::LogFile {
            path: "/nope/zoo.log".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(file.kind(), ErrorKind::FileOpen);
    }

    #[test]
    fn test_error_display() {
        let err = CoordinationError::RemoteFailure {
            op: "get_children",
            path: "/svc".into(),
            attempts: 3,
            source: StoreError::Marshalling,
        };
        let msg = format!("{err}");
        assert!(msg.contains("get_children failed for /svc"));
        assert!(msg.contains("after 3 attempt(s)"));
        assert!(msg.contains("marshalling error"));

        let err = CoordinationError::NotFound {
            path: "/missing".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_param());
        assert_eq!(err.to_string(), "node does not exist: /missing");
    }
}
