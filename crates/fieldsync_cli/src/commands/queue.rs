//! Queue command implementation.

use super::{format_time, open_store, print_json, CliResult, OutputFormat};
use fieldsync_core::LocalStore;
use fieldsync_protocol::SyncOperation;
use serde::Serialize;
use std::path::Path;

/// Queued operations and the ones evicted after failing.
#[derive(Debug, Serialize)]
pub struct QueueListing {
    /// Operations waiting for upload, in drain order.
    pub queued: Vec<SyncOperation>,
    /// Operations dropped from the queue, with their last error.
    pub failed: Vec<SyncOperation>,
}

/// Runs the queue command.
pub fn run(path: &Path, limit: Option<usize>, format: OutputFormat) -> CliResult<()> {
    let store = open_store(path)?;
    let listing = list(&store, limit);

    match format {
        OutputFormat::Json => print_json(&listing)?,
        OutputFormat::Text => {
            if listing.queued.is_empty() {
                println!("Queue is empty");
            } else {
                print_ops(&listing.queued);
                println!();
                println!("{} of {} operations", listing.queued.len(), store.queue_len());
            }
            if !listing.failed.is_empty() {
                println!();
                println!("Failed operations (run retry-failed to queue them again):");
                print_ops(&listing.failed);
            }
        }
    }
    Ok(())
}

fn print_ops(ops: &[SyncOperation]) {
    println!(
        "{:<36}  {:<6}  {:<8}  {:<16}  {:<36}  {:>7}",
        "OPERATION", "KIND", "PRIORITY", "TYPE", "ENTITY", "RETRIES"
    );
    for op in ops {
        println!(
            "{:<36}  {:<6}  {:<8}  {:<16}  {:<36}  {:>7}",
            op.id.to_string(),
            op.kind.to_string(),
            op.priority.to_string(),
            op.entity_type.to_string(),
            op.entity_id.to_string(),
            op.retry_count
        );
        println!("    queued {}", format_time(Some(op.timestamp)));
        if let Some(error) = &op.last_error {
            println!("    last error: {error}");
        }
    }
}

/// Queued operations in drain order, at most `limit`, plus every failed
/// operation.
pub fn list(store: &LocalStore, limit: Option<usize>) -> QueueListing {
    let mut queued = store.queued_ops();
    if let Some(limit) = limit {
        queued.truncate(limit);
    }
    QueueListing {
        queued,
        failed: store.failed_ops(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;
    use fieldsync_protocol::{OperationKind, Priority};

    #[test]
    fn lists_in_drain_order() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path());
        let store = open_store(dir.path()).unwrap();

        let listing = list(&store, None);
        let priorities: Vec<Priority> = listing.queued.iter().map(|op| op.priority).collect();

        assert_eq!(priorities, vec![Priority::High, Priority::Normal, Priority::Low]);
        assert!(listing.failed.is_empty());
    }

    #[test]
    fn limit_truncates() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path());
        let store = open_store(dir.path()).unwrap();

        let listing = list(&store, Some(1));

        assert_eq!(listing.queued.len(), 1);
        assert_eq!(listing.queued[0].priority, Priority::High);
    }

    #[test]
    fn evicted_delete_is_listed_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let ids = testing::seed(dir.path());
        {
            let store = open_store(dir.path()).unwrap();
            store.delete(&testing::inspections(), ids[0], Priority::High).unwrap();
            let delete = store
                .ops_for_entity(&testing::inspections(), ids[0])
                .into_iter()
                .find(|op| op.kind == OperationKind::Delete)
                .unwrap();
            for _ in 0..3 {
                store.nack(delete.id, "HTTP 503", true, 3).unwrap();
            }
        }

        let store = open_store(dir.path()).unwrap();
        let listing = list(&store, None);

        assert_eq!(listing.failed.len(), 1);
        assert_eq!(listing.failed[0].kind, OperationKind::Delete);
        assert_eq!(listing.failed[0].entity_id, ids[0]);
        assert_eq!(listing.failed[0].last_error.as_deref(), Some("HTTP 503"));
        assert!(listing.queued.iter().all(|op| op.kind != OperationKind::Delete));
        run(dir.path(), None, OutputFormat::Text).unwrap();
    }
}
