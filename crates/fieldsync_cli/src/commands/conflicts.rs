//! Conflicts command implementation.

use super::{format_time, open_store, print_json, CliResult, OutputFormat};
use fieldsync_core::LocalStore;
use fieldsync_protocol::ConflictCase;
use std::path::Path;

/// Runs the conflicts command.
pub fn run(path: &Path, include_resolved: bool, format: OutputFormat) -> CliResult<()> {
    let store = open_store(path)?;
    let cases = list(&store, include_resolved);

    match format {
        OutputFormat::Json => print_json(&cases)?,
        OutputFormat::Text => {
            if cases.is_empty() {
                println!("No conflicts");
                return Ok(());
            }
            for case in &cases {
                print_case(case);
            }
        }
    }
    Ok(())
}

/// Conflict cases, oldest first.
pub fn list(store: &LocalStore, include_resolved: bool) -> Vec<ConflictCase> {
    let mut cases = if include_resolved {
        store.conflicts()
    } else {
        store.open_conflicts()
    };
    cases.sort_by_key(|case| case.detected_at);
    cases
}

fn print_case(case: &ConflictCase) {
    println!("Conflict {}", case.id);
    println!("  Entity:    {}/{}", case.entity_type, case.entity_id);
    println!("  Detected:  {}", format_time(Some(case.detected_at)));
    println!("  Local:     modified {}", format_time(Some(case.local_modified)));
    if case.remote_deleted {
        println!("  Remote:    deleted {}", format_time(Some(case.remote_modified)));
    } else {
        println!("  Remote:    modified {}", format_time(Some(case.remote_modified)));
    }
    for field in &case.conflict_fields {
        let local = case.local_data.get(field).map(ToString::to_string);
        let remote = case.remote_data.get(field).map(ToString::to_string);
        println!(
            "    {field}: local={} remote={}",
            local.as_deref().unwrap_or("<absent>"),
            remote.as_deref().unwrap_or("<absent>")
        );
    }
    match (case.resolution, case.resolved_at) {
        (Some(side), at) => println!("  Resolved:  {side} at {}", format_time(at)),
        (None, _) => println!("  Resolved:  no"),
    }
    println!();
}
