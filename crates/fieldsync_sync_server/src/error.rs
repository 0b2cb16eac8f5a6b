//! Error types for the reference remote store.

use fieldsync_protocol::ErrorKind;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the remote store.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The table is not served by this store.
    #[error("table not configured: {0}")]
    UnknownTable(String),

    /// The request violates a constraint.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The store is temporarily unable to serve requests.
    #[error("store unavailable")]
    Unavailable,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Wire class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::UnknownTable(_) => ErrorKind::NotConfigured,
            ServerError::InvalidRequest(_) => ErrorKind::Rejected,
            ServerError::Unavailable | ServerError::Internal(_) => ErrorKind::Unavailable,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::InvalidRequest(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
