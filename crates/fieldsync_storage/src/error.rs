//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame is larger than the journal format allows.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the rejected frame.
        len: usize,
        /// Maximum accepted frame size.
        max: usize,
    },

    /// The journal is unreadable as a whole.
    #[error("journal corrupted: {0}")]
    Corrupted(String),

    /// Encryption, decryption or key handling failed.
    #[error("encryption error: {0}")]
    Encryption(String),
}

impl StorageError {
    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption(message.into())
    }
}
