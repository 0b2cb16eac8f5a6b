//! Error types for the local store.

use fieldsync_protocol::{ConflictId, EntityId, EntityType, OpId};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] fieldsync_storage::StorageError),

    /// Encoding, decoding or lifecycle error from the data model.
    #[error("protocol error: {0}")]
    Protocol(#[from] fieldsync_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the store directory.
    #[error("store is locked by another process")]
    StoreLocked,

    /// The store directory or journal is not usable.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// What is wrong.
        message: String,
    },

    /// No entity with this id exists.
    #[error("entity not found: {entity_type}/{id}")]
    EntityNotFound {
        /// Entity type searched.
        entity_type: EntityType,
        /// Missing id.
        id: EntityId,
    },

    /// No queued operation with this id exists.
    #[error("operation not found: {0}")]
    OperationNotFound(OpId),

    /// No conflict case with this id exists.
    #[error("conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    /// The conflict case was already resolved.
    #[error("conflict already resolved: {0}")]
    ConflictResolved(ConflictId),
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an entity not found error.
    pub fn entity_not_found(entity_type: &EntityType, id: EntityId) -> Self {
        Self::EntityNotFound {
            entity_type: entity_type.clone(),
            id,
        }
    }
}
