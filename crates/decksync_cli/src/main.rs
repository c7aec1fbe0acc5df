//! decksync CLI
//!
//! Command-line tools for decksync collections.
//!
//! # Commands
//!
//! - `inspect` - Display collection metadata and statistics
//! - `verify` - Verify collection integrity
//! - `sync` - Incremental sync with a server collection
//! - `full-sync` - Replace one side with the other
//! - `import` - Merge an extracted package into the collection
//! - `export` - Write the collection as an extracted package

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// decksync command-line collection tools.
#[derive(Parser)]
#[command(name = "decksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the collection file
    #[arg(global = true, short, long, env = "DECKSYNC_COLLECTION")]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display collection metadata and statistics
    Inspect {
        /// List decks with their card counts
        #[arg(short, long)]
        decks: bool,

        /// List note types
        #[arg(short, long)]
        models: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify collection integrity
    Verify,

    /// Incremental sync with a server collection
    Sync {
        #[command(flatten)]
        remote: commands::sync::RemoteArgs,

        /// Attempts for retryable transport failures
        #[arg(long, default_value = "3")]
        retries: u32,
    },

    /// Replace one side with the other when schemas diverged
    FullSync {
        #[command(flatten)]
        remote: commands::sync::RemoteArgs,

        /// Transfer direction
        #[arg(value_enum)]
        direction: commands::sync::Direction,
    },

    /// Merge an extracted package into the collection
    Import(commands::package::ImportArgs),

    /// Write the collection as an extracted package
    Export(commands::package::ExportArgs),

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect {
            decks,
            models,
            format,
        } => {
            let path = cli.path.ok_or("Collection path required for inspect")?;
            commands::inspect::run(&path, decks, models, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Collection path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Sync { remote, retries } => {
            let path = cli.path.ok_or("Collection path required for sync")?;
            commands::sync::run(&path, &remote, retries)?;
        }
        Commands::FullSync { remote, direction } => {
            let path = cli.path.ok_or("Collection path required for full-sync")?;
            commands::sync::run_full(&path, &remote, direction)?;
        }
        Commands::Import(args) => {
            let path = cli.path.ok_or("Collection path required for import")?;
            commands::package::import(&path, &args)?;
        }
        Commands::Export(args) => {
            let path = cli.path.ok_or("Collection path required for export")?;
            commands::package::export(&path, &args)?;
        }
        Commands::Version => {
            println!("decksync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Collection schema v{}", decksync_store::SCHEMA_VERSION);
            println!("Sync protocol v{}", decksync_protocol::PROTOCOL_VERSION);
        }
    }

    Ok(())
}
