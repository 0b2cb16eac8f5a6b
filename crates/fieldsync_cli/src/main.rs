//! FieldSync CLI
//!
//! Operator tools for inspecting and repairing a device store.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics and sync metadata
//! - `queue` - List queued upload operations in drain order
//! - `conflicts` - List conflict cases
//! - `resolve` - Resolve a conflict case with the local or remote side
//! - `retry-failed` - Move failed entities back to the upload queue
//! - `compact` - Rewrite the journal as a single snapshot

mod commands;

use clap::{Parser, Subcommand};
use commands::{CliError, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FieldSync device store tools.
#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics and sync metadata
    Inspect {
        /// List skipped journal frames
        #[arg(long)]
        corruption: bool,
    },

    /// List queued upload operations in drain order
    Queue {
        /// Maximum number of operations to list
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List conflict cases
    Conflicts {
        /// Include resolved cases
        #[arg(short, long)]
        all: bool,
    },

    /// Resolve a conflict case
    Resolve {
        /// Conflict case id
        id: String,

        /// Side to keep (local, remote)
        side: String,

        /// Upload priority of the resolved payload
        #[arg(long, default_value = "normal")]
        priority: String,
    },

    /// Move failed entities back to the upload queue
    RetryFailed {
        /// Upload priority of the requeued operations
        #[arg(long, default_value = "normal")]
        priority: String,
    },

    /// Rewrite the journal as a single snapshot
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = cli.format;
    let path = || cli.path.clone().ok_or(CliError::PathRequired);

    match cli.command {
        Commands::Inspect { corruption } => {
            commands::inspect::run(&path()?, corruption, format)?;
        }
        Commands::Queue { limit } => {
            commands::queue::run(&path()?, limit, format)?;
        }
        Commands::Conflicts { all } => {
            commands::conflicts::run(&path()?, all, format)?;
        }
        Commands::Resolve { id, side, priority } => {
            commands::resolve::run(&path()?, &id, &side, &priority, format)?;
        }
        Commands::RetryFailed { priority } => {
            commands::retry::run(&path()?, &priority, format)?;
        }
        Commands::Compact { dry_run } => {
            commands::compact::run(&path()?, dry_run, format)?;
        }
        Commands::Version => {
            println!("FieldSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Store schema v{}", fieldsync_core::SCHEMA_VERSION);
        }
    }

    Ok(())
}
