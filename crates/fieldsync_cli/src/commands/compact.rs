//! Compact command implementation.

use super::{open_store, print_json, CliResult, OutputFormat};
use fieldsync_core::LocalStore;
use serde::Serialize;
use std::path::Path;

/// Compaction statistics.
#[derive(Debug, Serialize)]
pub struct CompactStats {
    /// Frames before compaction.
    pub frames_before: u64,
    /// Frames after compaction.
    pub frames_after: u64,
    /// True if the journal was rewritten.
    pub compacted: bool,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool, format: OutputFormat) -> CliResult<()> {
    let store = open_store(path)?;
    let stats = compact(&store, dry_run)?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Text => {
            println!("Compacting journal at {}", path.display());
            if dry_run {
                println!("(dry run - no changes will be made)");
            }
            println!();
            println!("  Frames before: {}", stats.frames_before);
            println!("  Frames after:  {}", stats.frames_after);
            if stats.compacted {
                println!();
                println!("✓ Compaction complete");
            }
        }
    }
    Ok(())
}

/// Rewrites the journal unless it is already a single frame.
pub fn compact(store: &LocalStore, dry_run: bool) -> CliResult<CompactStats> {
    let frames_before = store.frame_count();
    if frames_before <= 1 {
        return Ok(CompactStats {
            frames_before,
            frames_after: frames_before,
            compacted: false,
        });
    }
    if dry_run {
        return Ok(CompactStats {
            frames_before,
            frames_after: 1,
            compacted: false,
        });
    }
    store.compact()?;
    Ok(CompactStats {
        frames_before,
        frames_after: store.frame_count(),
        compacted: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[test]
    fn compaction_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path());
        {
            let store = open_store(dir.path()).unwrap();
            let stats = compact(&store, false).unwrap();
            assert!(stats.compacted);
            assert!(stats.frames_before > 1);
            assert_eq!(stats.frames_after, 1);
        }

        let store = open_store(dir.path()).unwrap();
        assert_eq!(store.frame_count(), 1);
        assert_eq!(store.queue_len(), 3);
        assert_eq!(store.get_all(&testing::inspections()).len(), 3);
    }

    #[test]
    fn dry_run_leaves_journal_alone() {
        let dir = tempfile::tempdir().unwrap();
        testing::seed(dir.path());
        let store = open_store(dir.path()).unwrap();
        let before = store.frame_count();

        let stats = compact(&store, true).unwrap();

        assert!(!stats.compacted);
        assert_eq!(store.frame_count(), before);
    }
}
