//! Resolve command implementation.

use super::{open_store, print_json, CliResult, OutputFormat};
use fieldsync_core::LocalStore;
use fieldsync_protocol::{ConflictCase, ConflictId, ConflictSide, Priority};
use std::path::Path;
use tracing::info;

/// Runs the resolve command.
pub fn run(
    path: &Path,
    id: &str,
    side: &str,
    priority: &str,
    format: OutputFormat,
) -> CliResult<()> {
    let id: ConflictId = id.parse()?;
    let side: ConflictSide = side.parse()?;
    let priority: Priority = priority.parse()?;

    let store = open_store(path)?;
    let case = resolve(&store, id, side, priority)?;

    match format {
        OutputFormat::Json => print_json(&case)?,
        OutputFormat::Text => {
            println!(
                "✓ Resolved {} on {}/{} with the {side} version",
                case.id, case.entity_type, case.entity_id
            );
            println!("  The entity will upload on the next sync");
        }
    }
    Ok(())
}

/// Applies `side` to an open case and syncs the journal.
pub fn resolve(
    store: &LocalStore,
    id: ConflictId,
    side: ConflictSide,
    priority: Priority,
) -> CliResult<ConflictCase> {
    let case = store.resolve_conflict(id, side, priority)?;
    store.sync()?;
    info!(conflict = %id, %side, "conflict resolved from the command line");
    Ok(case)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{self, open_case};
    use crate::commands::CliError;
    use fieldsync_core::CoreError;
    use fieldsync_protocol::SyncStatus;

    #[test]
    fn remote_side_replaces_local_payload() {
        let dir = tempfile::tempdir().unwrap();
        let ids = testing::seed(dir.path());
        let case = {
            let store = open_store(dir.path()).unwrap();
            let case = open_case(&store, ids[0]);
            resolve(&store, case.id, ConflictSide::Remote, Priority::High).unwrap();
            case
        };

        let store = open_store(dir.path()).unwrap();
        let record = store.get(&testing::inspections(), ids[0]).unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.payload, testing::payload(serde_json::json!({"site": "B"})));
        assert!(store.conflict(case.id).unwrap().resolved);
    }

    #[test]
    fn resolving_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ids = testing::seed(dir.path());
        let store = open_store(dir.path()).unwrap();
        let case = open_case(&store, ids[0]);
        resolve(&store, case.id, ConflictSide::Local, Priority::Normal).unwrap();

        let err = resolve(&store, case.id, ConflictSide::Local, Priority::Normal).unwrap_err();

        assert!(matches!(err, CliError::Store(CoreError::ConflictResolved(_))));
    }

    #[test]
    fn bad_side_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path());
        let id = ConflictId::new().to_string();

        let err = run(dir.path(), &id, "both", "normal", OutputFormat::Text).unwrap_err();

        assert!(matches!(err, CliError::Parse(_)));
    }
}
