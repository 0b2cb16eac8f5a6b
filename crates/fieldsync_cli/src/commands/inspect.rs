//! Inspect command implementation.

use super::{format_time, open_store, print_json, CliResult, OutputFormat};
use fieldsync_core::LocalStore;
use fieldsync_protocol::{StatusSnapshot, Timestamp};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Schema version recorded in the store.
    pub schema_version: Option<u32>,
    /// Frames in the journal.
    pub frame_count: u64,
    /// True if the journal is past the compaction threshold.
    pub needs_compaction: bool,
    /// Entity counts by sync status.
    pub status: StatusSnapshot,
    /// Queued upload operations.
    pub queued_ops: usize,
    /// Operations evicted after failing.
    pub failed_ops: usize,
    /// Open conflict cases.
    pub open_conflicts: usize,
    /// Per entity type statistics.
    pub entity_types: Vec<TypeStats>,
    /// Journal frames skipped on open.
    pub corrupt_frames: usize,
    /// Details of skipped frames (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption: Option<Vec<CorruptFrameInfo>>,
}

/// Statistics for one entity type.
#[derive(Debug, Serialize)]
pub struct TypeStats {
    /// Entity type name.
    pub name: String,
    /// Number of entities.
    pub entity_count: usize,
    /// Download cursor.
    pub cursor: Option<Timestamp>,
}

/// A journal frame skipped on open.
#[derive(Debug, Serialize)]
pub struct CorruptFrameInfo {
    /// Frame position.
    pub index: u64,
    /// Why it was skipped.
    pub reason: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_corruption: bool, format: OutputFormat) -> CliResult<()> {
    let store = open_store(path)?;
    let result = inspect(&store, path, show_corruption)?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

/// Collects statistics from an open store.
pub fn inspect(store: &LocalStore, path: &Path, show_corruption: bool) -> CliResult<InspectResult> {
    let entity_types = store
        .entity_types()
        .into_iter()
        .map(|entity_type| TypeStats {
            name: entity_type.to_string(),
            entity_count: store.get_all(&entity_type).len(),
            cursor: store.cursor(&entity_type),
        })
        .collect();
    let report = store.corruption_report();

    Ok(InspectResult {
        path: path.display().to_string(),
        schema_version: store.schema_version()?,
        frame_count: store.frame_count(),
        needs_compaction: store.needs_compaction(),
        status: store.status_snapshot(),
        queued_ops: store.queue_len(),
        failed_ops: store.failed_ops().len(),
        open_conflicts: store.open_conflicts().len(),
        entity_types,
        corrupt_frames: report.len(),
        corruption: show_corruption.then(|| {
            report
                .iter()
                .map(|frame| CorruptFrameInfo {
                    index: frame.index,
                    reason: frame.reason.clone(),
                })
                .collect()
        }),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("FieldSync Store Inspection");
    println!("==========================");
    println!();
    println!("Path:    {}", result.path);
    match result.schema_version {
        Some(version) => println!("Schema:  v{version}"),
        None => println!("Schema:  unknown"),
    }
    println!();
    println!("Journal:");
    println!("  Frames:          {}", result.frame_count);
    println!(
        "  Compaction:      {}",
        if result.needs_compaction { "recommended" } else { "not needed" }
    );
    println!("  Corrupt frames:  {}", result.corrupt_frames);
    println!();
    println!("Entities:");
    println!("  Total:     {}", result.status.total);
    println!("  Synced:    {}", result.status.synced);
    println!("  Pending:   {}", result.status.pending);
    println!("  Error:     {}", result.status.error);
    println!("  Conflict:  {}", result.status.conflict);
    println!();
    println!("Sync:");
    println!("  Queued operations: {}", result.queued_ops);
    println!("  Failed operations: {}", result.failed_ops);
    println!("  Open conflicts:    {}", result.open_conflicts);
    println!("  Last sync:         {}", format_time(result.status.last_sync));

    if !result.entity_types.is_empty() {
        println!();
        println!("Entity types:");
        for ty in &result.entity_types {
            println!(
                "  {:<20} {:>6} entities, cursor {}",
                ty.name,
                ty.entity_count,
                format_time(ty.cursor)
            );
        }
    }

    if let Some(frames) = &result.corruption {
        println!();
        println!("Skipped frames:");
        for frame in frames {
            println!("  #{}: {}", frame.index, frame.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[test]
    fn inspect_counts_entities_and_queue() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path());
        let store = open_store(dir.path()).unwrap();

        let result = inspect(&store, dir.path(), true).unwrap();

        assert_eq!(result.status.total, 3);
        assert_eq!(result.status.pending, 3);
        assert_eq!(result.queued_ops, 3);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.entity_types.len(), 1);
        assert_eq!(result.entity_types[0].name, "inspections");
        assert_eq!(result.entity_types[0].cursor, None);
        assert_eq!(result.corrupt_frames, 0);
        assert_eq!(result.corruption.as_deref().map(<[_]>::len), Some(0));
    }

    #[test]
    fn json_omits_corruption_unless_requested() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path());
        let store = open_store(dir.path()).unwrap();

        let result = inspect(&store, dir.path(), false).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("corruption").is_none());
        assert_eq!(json["status"]["pending"], 3);
    }
}
