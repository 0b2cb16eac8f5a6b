//! # FieldSync Storage
//!
//! Durable frame journals for the FieldSync local store.
//!
//! Backends store opaque frames in append order. They know nothing about
//! entities, queues or sync state; the local store owns the frame contents.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - Persistent journal file with checksummed frames
//! - [`EncryptedBackend`] - Wrapper that seals frames with AES-256-GCM
//!
//! ## Example
//!
//! ```rust
//! use fieldsync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append_frame(b"hello").unwrap();
//! let scan = backend.scan().unwrap();
//! assert_eq!(scan.frames[0].body, b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod encrypted;
mod error;
mod file;
mod frame;
mod memory;

pub use backend::StorageBackend;
pub use encrypted::{EncryptedBackend, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use frame::{DamagedFrame, Frame, FrameScan, MAX_FRAME_SIZE};
pub use memory::InMemoryBackend;
