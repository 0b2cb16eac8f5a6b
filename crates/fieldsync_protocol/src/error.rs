//! Error types for protocol values and codecs.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while parsing or encoding protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR or JSON encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR or JSON decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A textual value could not be parsed.
    #[error("invalid {kind}: {value:?}")]
    Parse {
        /// What was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A status transition is not allowed by the lifecycle.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },
}

impl ProtocolError {
    /// Creates a parse error.
    pub fn parse(kind: &'static str, value: impl Into<String>) -> Self {
        Self::Parse {
            kind,
            value: value.into(),
        }
    }
}
