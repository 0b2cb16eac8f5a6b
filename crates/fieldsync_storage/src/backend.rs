//! Storage backend trait definition.

use crate::error::StorageResult;
use crate::frame::FrameScan;

/// A durable, append-only journal of opaque frames.
///
/// Backends store and return frames without interpreting them. The local
/// store owns the encoding of what goes inside a frame.
///
/// # Invariants
///
/// - `append_frame` returns the zero-based index of the new frame
/// - `scan` returns every intact frame in append order and reports the
///   damaged ones instead of failing the whole read
/// - `rewrite` atomically replaces the whole journal
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
/// - [`super::EncryptedBackend`] - Encrypting wrapper around another backend
pub trait StorageBackend: Send + Sync {
    /// Appends one frame to the end of the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large or an I/O error occurs.
    fn append_frame(&mut self, frame: &[u8]) -> StorageResult<u64>;

    /// Reads the journal from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error only if the journal cannot be read at all.
    fn scan(&self) -> StorageResult<FrameScan>;

    /// Atomically replaces the journal contents with `frames`.
    ///
    /// Used for compaction: either the old journal or the new one survives
    /// a crash, never a mix.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement cannot be written.
    fn rewrite(&mut self, frames: &[Vec<u8>]) -> StorageResult<()>;

    /// Returns the number of frames appended since the last rewrite or open.
    fn frame_count(&self) -> u64;

    /// Makes all appended frames durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;
}
