//! Retry-failed command implementation.

use super::{open_store, print_json, CliResult, OutputFormat};
use fieldsync_protocol::Priority;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct RetryResult {
    reset: usize,
    queued_ops: usize,
}

/// Runs the retry-failed command.
pub fn run(path: &Path, priority: &str, format: OutputFormat) -> CliResult<()> {
    let priority: Priority = priority.parse()?;
    let store = open_store(path)?;
    let reset = store.reset_failed(priority)?;
    store.sync()?;

    let result = RetryResult {
        reset,
        queued_ops: store.queue_len(),
    };
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text if reset == 0 => println!("No failed entities"),
        OutputFormat::Text => {
            println!("✓ Requeued {reset} failed entities at {priority} priority");
        }
    }
    Ok(())
}
