//! Queued sync operations.

use crate::clock::Timestamp;
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{EntityId, EntityType, OpId};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Kind of mutation an operation carries to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Entity was created locally.
    Create,
    /// Entity was updated locally.
    Update,
    /// Entity was deleted locally.
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Upload priority. Higher priorities drain first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background data.
    Low,
    /// Ordinary edits.
    #[default]
    Normal,
    /// Time-sensitive edits.
    High,
    /// Safety-relevant data that must go first.
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

impl FromStr for Priority {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ProtocolError::parse("priority", s)),
        }
    }
}

/// A pending mutation waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Queue-assigned id.
    pub id: OpId,
    /// Mutation kind.
    pub kind: OperationKind,
    /// Entity type.
    pub entity_type: EntityType,
    /// Target entity.
    pub entity_id: EntityId,
    /// Payload at the time of the write. `None` for deletes.
    pub payload: Option<Payload>,
    /// Upload priority.
    pub priority: Priority,
    /// When the operation was queued.
    pub timestamp: Timestamp,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Message of the last failure.
    pub last_error: Option<String>,
}

impl SyncOperation {
    /// Orders operations for draining: priority descending, then oldest
    /// first, then by queue id.
    #[must_use]
    pub fn drain_order(a: &Self, b: &Self) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then(a.timestamp.cmp(&b.timestamp))
            .then(a.id.cmp(&b.id))
    }
}
