//! # FieldSync Sync Server
//!
//! Reference remote store for FieldSync clients.
//!
//! This crate provides:
//! - Authoritative in-memory tables with server-assigned `updated_at`
//! - Upsert-by-id inserts and idempotent, tombstoning deletes
//! - `select_where` and `changed_since` queries
//! - JSON request routing for the table protocol
//!
//! The store is used as the remote in integration tests and as a loopback
//! target for the HTTP adapter.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod tables;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use server::SyncServer;
pub use tables::RemoteTables;
