//! # FieldSync Sync Engine
//!
//! Offline-first synchronization between a device's [`LocalStore`] and a
//! remote store.
//!
//! This crate provides:
//! - The [`SyncEngine`] orchestrator and its run phases
//! - Connectivity monitoring with quality-dependent sync intervals
//! - Field-level conflict detection with last-writer-wins past a threshold
//! - The [`RemoteAdapter`] boundary with table, HTTP, offline and
//!   in-memory implementations
//! - A background scheduler driven by ticks, reconnects and retries
//!
//! ## Architecture
//!
//! Every local write lands in the store first and queues an upload in the
//! same commit, so the device works the same with or without a network.
//! A run then:
//! 1. Downloads remote changes since each entity type's cursor
//! 2. Uploads queued operations, highest priority first
//! 3. Re-evaluates open conflicts
//! 4. Records the run and does maintenance
//!
//! ## Key Invariants
//!
//! - At most one run is in flight
//! - A write is durable before the call that made it returns
//! - Creates are upserts, so a lost acknowledgement never duplicates data
//! - An entity waiting for a conflict decision is never uploaded
//! - Cursors only move forward
//!
//! [`LocalStore`]: fieldsync_core::LocalStore

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod connectivity;
mod error;
mod http;
mod memory;
mod remote;
mod scheduler;
mod state;
mod status;

pub use config::{
    ConflictConfig, ConnectivityConfig, MaintenanceConfig, RetryConfig, SyncConfig,
};
pub use conflict::{ConflictResolver, Verdict};
pub use connectivity::{
    classify, ConnectivityMonitor, ConnectivityState, NetworkQuality, NetworkSignal, Transition,
};
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use http::{
    status_to_error, HttpClient, HttpResponse, HttpTableBackend, LoopbackClient, LoopbackServer,
    TABLES_ENDPOINT,
};
pub use memory::{CallCounts, Fault, MemoryRemote};
pub use remote::{OfflineRemote, RemoteAdapter, TableBackend, TableRemote};
pub use scheduler::SchedulerHandle;
pub use state::{SyncEngine, SyncRunReport, SyncState, SyncStats};
pub use status::StatusBus;
