//! Store configuration.

use fieldsync_protocol::{Clock, SystemClock};
use fieldsync_storage::MAX_FRAME_SIZE;
use std::fmt;
use std::sync::Arc;

/// Configuration for opening a [`crate::LocalStore`].
#[derive(Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the journal on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Number of journal frames after which maintenance compacts the journal.
    pub compact_threshold: u64,

    /// Target size of one frame when compaction writes a snapshot. Larger
    /// stores are written as several frames.
    pub snapshot_frame_bytes: usize,

    /// Time source for modification stamps.
    pub clock: Arc<dyn Clock>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            compact_threshold: 1_000,
            snapshot_frame_bytes: MAX_FRAME_SIZE / 4,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("create_if_missing", &self.create_if_missing)
            .field("sync_on_commit", &self.sync_on_commit)
            .field("compact_threshold", &self.compact_threshold)
            .field("snapshot_frame_bytes", &self.snapshot_frame_bytes)
            .finish_non_exhaustive()
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the compaction threshold in frames.
    #[must_use]
    pub fn compact_threshold(mut self, frames: u64) -> Self {
        self.compact_threshold = frames.max(1);
        self
    }

    /// Sets the snapshot frame size, capped at the largest frame the
    /// journal accepts.
    #[must_use]
    pub fn snapshot_frame_bytes(mut self, bytes: usize) -> Self {
        self.snapshot_frame_bytes = bytes.clamp(1, MAX_FRAME_SIZE);
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_protocol::ManualClock;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert_eq!(config.compact_threshold, 1_000);
        assert_eq!(config.snapshot_frame_bytes, MAX_FRAME_SIZE / 4);
    }

    #[test]
    fn builder() {
        let config = StoreConfig::new()
            .create_if_missing(false)
            .sync_on_commit(false)
            .compact_threshold(0)
            .snapshot_frame_bytes(usize::MAX)
            .with_clock(Arc::new(ManualClock::new(77)));
        assert!(!config.create_if_missing);
        assert_eq!(config.compact_threshold, 1);
        assert_eq!(config.snapshot_frame_bytes, MAX_FRAME_SIZE);
        assert_eq!(config.clock.now(), 77);
    }
}
