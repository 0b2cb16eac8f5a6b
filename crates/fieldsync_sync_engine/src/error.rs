//! Error types for the sync engine.

use fieldsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for remote adapter calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failure reported by a remote adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote could not be reached or failed transiently.
    #[error("network error: {0}")]
    Network(String),

    /// The remote refused the data. Retrying will not help.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// No remote is configured for this entity type or deployment.
    #[error("remote not configured: {0}")]
    NotConfigured(String),
}

impl RemoteError {
    /// Creates a transient network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Creates a not-configured error.
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::NotConfigured(message.into())
    }

    /// Returns true if the failed call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Returns true for the soft "no remote" case.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote adapter failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] fieldsync_core::CoreError),

    /// Data model failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The local journal contained frames that could not be decoded.
    #[error("local journal has {frames} corrupt frame(s)")]
    LocalCorruption {
        /// Number of frames skipped on open.
        frames: usize,
    },

    /// The device is offline.
    #[error("device is offline")]
    Offline,

    /// Another run holds the in-flight lock.
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    /// Invalid input from the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SyncError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::Offline | SyncError::AlreadyRunning => true,
            _ => false,
        }
    }
}
