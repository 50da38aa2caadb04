//! Sparkle CLI
//!
//! Command-line tools for looking at coordinator state offline.
//!
//! # Commands
//!
//! - `inspect` - Display per-table row counts of a snapshot and check its indexes
//! - `tenants` - Show which tenants can access a row
//! - `replay` - Feed captured host traffic through a Twilight session

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Sparkle command-line state tools.
#[derive(Parser)]
#[command(name = "sparkle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display row counts of a snapshot and verify its indexes
    Inspect {
        /// Snapshot file (JSON array of change tuples)
        snapshot: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the tenants that can access a row
    Tenants {
        /// Snapshot file (JSON array of change tuples)
        snapshot: PathBuf,

        /// Table of the row
        table: String,

        /// Primary key as JSON; bare words are taken as strings
        pkey: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay captured host messages through a session
    Replay {
        /// Messages file, one JSON message per line
        messages: PathBuf,

        /// Host the messages came from
        #[arg(long)]
        host: String,

        /// Snapshot to start from
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Where to write the resulting snapshot
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { snapshot, format } => {
            commands::inspect::run(&snapshot, &format)?;
        }
        Commands::Tenants {
            snapshot,
            table,
            pkey,
            format,
        } => {
            commands::tenants::run(&snapshot, &table, &pkey, &format)?;
        }
        Commands::Replay {
            messages,
            host,
            snapshot,
            output,
            format,
        } => {
            commands::replay::run(
                &messages,
                &host,
                snapshot.as_deref(),
                output.as_deref(),
                &format,
            )?;
        }
        Commands::Version => {
            println!("Sparkle CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
