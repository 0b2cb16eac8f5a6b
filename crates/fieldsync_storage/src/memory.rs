//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::StorageResult;
use crate::frame::{decode_frames, encode_frame, FrameScan};
use parking_lot::RwLock;

/// An in-memory frame journal.
///
/// Frames are held in the same byte layout the file backend writes, so
/// corruption and torn-write scenarios can be reproduced without touching
/// the disk.
///
/// # Example
///
/// ```rust
/// use fieldsync_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// assert_eq!(backend.append_frame(b"record").unwrap(), 0);
/// assert_eq!(backend.scan().unwrap().frames.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
    frames: RwLock<u64>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend over pre-existing journal bytes.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        let frames = decode_frames(&bytes).total() as u64;
        Self {
            bytes: RwLock::new(bytes),
            frames: RwLock::new(frames),
        }
    }

    /// Returns a copy of the raw journal bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Flips every bit of the byte at `offset`, if it exists.
    pub fn corrupt_byte(&self, offset: usize) {
        if let Some(byte) = self.bytes.write().get_mut(offset) {
            *byte ^= 0xFF;
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn append_frame(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let encoded = encode_frame(frame)?;
        self.bytes.write().extend_from_slice(&encoded);
        let mut count = self.frames.write();
        let index = *count;
        *count += 1;
        Ok(index)
    }

    fn scan(&self) -> StorageResult<FrameScan> {
        Ok(decode_frames(&self.bytes.read()))
    }

    fn rewrite(&mut self, frames: &[Vec<u8>]) -> StorageResult<()> {
        let mut fresh = Vec::new();
        for frame in frames {
            fresh.extend(encode_frame(frame)?);
        }
        *self.bytes.write() = fresh;
        *self.frames.write() = frames.len() as u64;
        Ok(())
    }

    fn frame_count(&self) -> u64 {
        *self.frames.read()
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
