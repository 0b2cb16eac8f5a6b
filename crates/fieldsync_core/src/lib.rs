//! # FieldSync Core
//!
//! The durable local store behind the sync engine.
//!
//! A [`LocalStore`] holds:
//! - one table per entity type, written through on every local change
//! - the sync queue of pending uploads, drained by priority
//! - key-value metadata (per-type cursors, last sync time, schema version)
//! - conflict cases awaiting or recording a decision
//!
//! Every mutation is committed as one frame in a journal, together with the
//! queue entries it creates, and the tables are rebuilt by replaying the
//! journal on open.
//!
//! ```rust
//! use fieldsync_core::LocalStore;
//! use fieldsync_protocol::{EntityId, EntityType, Payload, Priority, SyncStatus};
//!
//! let store = LocalStore::open_in_memory().unwrap();
//! let forms = EntityType::from("forms");
//! let id = EntityId::new();
//! store.put(&forms, id, Payload::new(), Priority::Normal).unwrap();
//!
//! assert_eq!(store.get(&forms, id).unwrap().sync_status, SyncStatus::Pending);
//! assert_eq!(store.queue_len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflicts;
mod dir;
mod entity;
mod error;
mod journal;
mod metadata;
mod queue;
mod store;
mod tables;

pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use queue::NackOutcome;
pub use store::{CorruptFrame, LocalStore, SCHEMA_VERSION};
