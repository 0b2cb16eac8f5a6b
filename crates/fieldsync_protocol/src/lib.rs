//! # FieldSync Protocol
//!
//! Data model shared by the local store, the sync engine and remote stores.
//!
//! This crate provides:
//! - [`EntityRecord`] and the [`SyncStatus`] lifecycle
//! - [`SyncOperation`] queue entries with [`Priority`] ordering
//! - [`ConflictCase`] and field-level divergence via [`FieldPolicy`]
//! - [`TableRequest`]/[`TableResponse`] messages for table-oriented remotes
//! - Content hashing and CBOR codecs
//!
//! This is a pure crate with no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod codec;
mod conflict;
mod error;
mod ids;
mod messages;
mod operation;
mod payload;
mod record;
mod status;

pub use clock::{format_timestamp, Clock, ManualClock, SystemClock, Timestamp, HOUR_MS, MINUTE_MS};
pub use codec::{from_cbor, to_cbor};
pub use conflict::{ConflictCase, ConflictSide, FieldPolicy};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{ConflictId, EntityId, EntityType, OpId};
pub use messages::{
    filter_matches, from_json_body, to_json_body, ErrorKind, Filter, TableRequest, TableResponse,
};
pub use operation::{OperationKind, Priority, SyncOperation};
pub use payload::{canonical_json, merge_patch, payload_from_value, ContentHash, Payload};
pub use record::{AnnotatedEntity, EntityRecord, RemoteRecord, SyncStatus};
pub use status::StatusSnapshot;
