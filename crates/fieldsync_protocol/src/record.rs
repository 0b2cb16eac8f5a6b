//! Entity records and their sync lifecycle.

use crate::clock::Timestamp;
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{EntityId, EntityType};
use crate::payload::{ContentHash, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Sync status of a single entity.
///
/// ```text
/// Pending -> Syncing -> Synced | Error
/// Error   -> Pending            (manual retry)
/// Synced  -> Pending            (local mutation)
/// Pending | Synced | Error -> Conflict
/// Conflict -> Pending           (resolution)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local change not yet confirmed by the remote.
    Pending,
    /// An upload for this entity is in flight.
    Syncing,
    /// Local and remote agree.
    Synced,
    /// Upload failed permanently or exhausted its retries.
    Error,
    /// Local and remote diverged and need a decision.
    Conflict,
}

impl SyncStatus {
    /// Returns true if moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SyncStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Syncing | Conflict | Error)
                | (Syncing, Synced | Error | Pending | Conflict)
                | (Synced, Pending | Conflict)
                | (Error, Pending | Conflict)
                | (Conflict, Pending)
        )
    }

    /// Checks a transition, returning an error if it is not allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidTransition`] for a disallowed move.
    pub fn transition(self, next: Self) -> ProtocolResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ProtocolError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Returns true if the entity carries a local change the remote has not
    /// confirmed.
    #[must_use]
    pub fn has_unsynced_change(self) -> bool {
        matches!(self, Self::Pending | Self::Syncing | Self::Error)
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally stored entity with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity id.
    pub id: EntityId,
    /// Entity type.
    pub entity_type: EntityType,
    /// Business data.
    pub payload: Payload,
    /// Last local modification.
    pub last_modified: Timestamp,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// Failed upload attempts since the last success.
    pub retry_count: u32,
    /// When an upload was last attempted.
    pub last_sync_attempt: Option<Timestamp>,
    /// Message of the last upload failure.
    pub last_error: Option<String>,
    /// Digest of `payload`.
    pub content_hash: ContentHash,
    /// `updated_at` of the last remote version applied or confirmed.
    pub remote_updated_at: Option<Timestamp>,
}

impl EntityRecord {
    /// Creates a pending record for a fresh local write.
    #[must_use]
    pub fn new_local(
        entity_type: EntityType,
        id: EntityId,
        payload: Payload,
        now: Timestamp,
    ) -> Self {
        let content_hash = ContentHash::of(&payload);
        Self {
            id,
            entity_type,
            payload,
            last_modified: now,
            sync_status: SyncStatus::Pending,
            retry_count: 0,
            last_sync_attempt: None,
            last_error: None,
            content_hash,
            remote_updated_at: None,
        }
    }

    /// Creates a synced record from data confirmed by the remote.
    #[must_use]
    pub fn from_remote(entity_type: EntityType, remote: &RemoteRecord) -> Self {
        Self {
            id: remote.id,
            entity_type,
            payload: remote.payload.clone(),
            last_modified: remote.updated_at,
            sync_status: SyncStatus::Synced,
            retry_count: 0,
            last_sync_attempt: None,
            last_error: None,
            content_hash: ContentHash::of(&remote.payload),
            remote_updated_at: Some(remote.updated_at),
        }
    }
}

/// A record as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Entity id.
    pub id: EntityId,
    /// Business data. Empty for tombstones.
    #[serde(default)]
    pub payload: Payload,
    /// Server-assigned modification time.
    pub updated_at: Timestamp,
    /// True if the record was deleted remotely.
    #[serde(default)]
    pub deleted: bool,
}

impl RemoteRecord {
    /// Digest of the remote payload.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.payload)
    }
}

/// Caller-facing view of an entity: its data plus status flags.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedEntity {
    /// Entity id.
    pub id: EntityId,
    /// Business data.
    pub data: Payload,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// Last local modification.
    pub last_modified: Timestamp,
}

impl AnnotatedEntity {
    /// Renders the entity as JSON with `id`, `_syncStatus` and
    /// `_lastModified` added next to the business fields.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = self.data.clone();
        object.insert("id".into(), Value::String(self.id.to_string()));
        object.insert(
            "_syncStatus".into(),
            Value::String(self.sync_status.as_str().into()),
        );
        object.insert("_lastModified".into(), Value::from(self.last_modified));
        Value::Object(object)
    }
}

impl From<&EntityRecord> for AnnotatedEntity {
    fn from(record: &EntityRecord) -> Self {
        Self {
            id: record.id,
            data: record.payload.clone(),
            sync_status: record.sync_status,
            last_modified: record.last_modified,
        }
    }
}
