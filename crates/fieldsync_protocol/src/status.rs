//! Aggregate sync status broadcast to subscribers.

use crate::clock::Timestamp;
use crate::record::SyncStatus;
use serde::{Deserialize, Serialize};

/// Point-in-time counts of entities per sync status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// All entities across every type.
    pub total: usize,
    /// Entities confirmed by the remote.
    pub synced: usize,
    /// Entities waiting for upload, including in-flight ones.
    pub pending: usize,
    /// Entities that failed permanently.
    pub error: usize,
    /// Entities waiting for a conflict decision.
    pub conflict: usize,
    /// Completion time of the last sync run.
    pub last_sync: Option<Timestamp>,
    /// True while a run is in flight.
    pub in_progress: bool,
}

impl StatusSnapshot {
    /// Counts one entity with the given status.
    pub fn count(&mut self, status: SyncStatus) {
        self.total += 1;
        match status {
            SyncStatus::Pending | SyncStatus::Syncing => self.pending += 1,
            SyncStatus::Synced => self.synced += 1,
            SyncStatus::Error => self.error += 1,
            SyncStatus::Conflict => self.conflict += 1,
        }
    }

    /// Returns true if nothing is waiting for upload or a decision.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.error == 0 && self.conflict == 0
    }
}
