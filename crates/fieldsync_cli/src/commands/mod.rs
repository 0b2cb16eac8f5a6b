//! CLI command implementations.

pub mod compact;
pub mod conflicts;
pub mod inspect;
pub mod queue;
pub mod resolve;
pub mod retry;

use fieldsync_core::{CoreError, LocalStore, StoreConfig};
use fieldsync_protocol::{format_timestamp, ProtocolError, Timestamp};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const JOURNAL_FILE: &str = "journal.log";

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command needs `--path`.
    #[error("store path required (use --path)")]
    PathRequired,

    /// No journal at the given path.
    #[error("no store found at {0}")]
    NoStore(PathBuf),

    /// Store error.
    #[error(transparent)]
    Store(#[from] CoreError),

    /// Bad argument value.
    #[error(transparent)]
    Parse(#[from] ProtocolError),

    /// JSON output failed.
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Opens an existing store. Never creates one.
pub fn open_store(path: &Path) -> CliResult<LocalStore> {
    if !path.join(JOURNAL_FILE).exists() {
        return Err(CliError::NoStore(path.to_path_buf()));
    }
    Ok(LocalStore::open(
        path,
        StoreConfig::default().create_if_missing(false),
    )?)
}

/// Prints `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Formats an optional timestamp for text output.
pub fn format_time(ts: Option<Timestamp>) -> String {
    ts.map(format_timestamp).unwrap_or_else(|| "never".to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use fieldsync_core::{LocalStore, StoreConfig};
    use fieldsync_protocol::{
        payload_from_value, ConflictCase, EntityId, EntityType, Payload, Priority, RemoteRecord,
    };
    use std::collections::BTreeSet;
    use std::path::Path;

    pub fn inspections() -> EntityType {
        EntityType::from("inspections")
    }

    pub fn payload(value: serde_json::Value) -> Payload {
        payload_from_value(value).unwrap()
    }

    /// Creates a store with one entity per priority and closes it.
    pub fn seed(path: &Path) -> Vec<EntityId> {
        let store = LocalStore::open(path, StoreConfig::default()).unwrap();
        let ids = [Priority::Low, Priority::High, Priority::Normal]
            .into_iter()
            .map(|priority| {
                let id = EntityId::new();
                store
                    .put(&inspections(), id, payload(serde_json::json!({"site": "A"})), priority)
                    .unwrap();
                id
            })
            .collect();
        store.sync().unwrap();
        ids
    }

    /// Opens a case on `id` over the `site` field.
    pub fn open_case(store: &LocalStore, id: EntityId) -> ConflictCase {
        let remote = RemoteRecord {
            id,
            payload: payload(serde_json::json!({"site": "B"})),
            updated_at: store.now(),
            deleted: false,
        };
        let fields: BTreeSet<String> = ["site".to_string()].into();
        store.open_conflict(&inspections(), id, &remote, fields).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_store(dir.path()).unwrap_err();
        assert!(matches!(err, CliError::NoStore(_)));
        assert!(!dir.path().join(JOURNAL_FILE).exists());
    }

    #[test]
    fn existing_store_opens() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path());
        let store = open_store(dir.path()).unwrap();
        assert_eq!(store.queue_len(), 3);
    }

    #[test]
    fn never_is_shown_for_missing_time() {
        assert_eq!(format_time(None), "never");
        assert!(format_time(Some(0)).starts_with("1970-01-01"));
    }
}
