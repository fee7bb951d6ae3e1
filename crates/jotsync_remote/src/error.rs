//! Error types for remote store operations.

use thiserror::Error;

/// Result type for remote store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur when talking to a remote document store.
///
/// The sync engine only distinguishes two recoverable kinds: transport
/// failures (retried with identical parameters) and conflicts (resolved by
/// folding pending items and re-fetching). Everything else indicates a
/// broken precondition on the caller's side.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Network or server failure. Always safe to retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// Conditional upload rejected: the server's revision no longer matches
    /// the one the caller observed, or the target path no longer matches.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested document does not exist on the remote store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request or token (bad path, unparsable cursor).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Returns true if the operation should be retried with the same
    /// parameters.
    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }

    /// Returns true if this is a concurrent-write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}
