//! jotsync CLI
//!
//! Command-line client for synchronizing an append-only note document with a
//! shared directory store.
//!
//! # Commands
//!
//! - `init` - Create the document in the store
//! - `show` - Print the current document
//! - `append` - Append items and wait for the commit
//! - `watch` - Follow remote changes, appending lines read from stdin

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// jotsync command-line client.
#[derive(Parser)]
#[command(name = "jotsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Document name within the store
    #[arg(global = true, short, long, default_value = "jot.txt")]
    doc: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the document in the store
    Init {
        /// Initial items, one per argument
        seed: Vec<String>,

        /// Replace the document if it already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Print the current document
    Show,

    /// Append items and wait for the commit
    Append {
        /// Items to append, one per argument
        items: Vec<String>,
    },

    /// Follow remote changes, appending lines read from stdin
    Watch {
        /// Long-poll timeout in seconds
        #[arg(short, long, default_value = "30")]
        poll_timeout: u64,
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
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { seed, force } => {
            let root = cli.root.ok_or("Store directory required for init")?;
            commands::init::run(&root, &cli.doc, &seed, force)?;
        }
        Commands::Show => {
            let root = cli.root.ok_or("Store directory required for show")?;
            commands::show::run(&root, &cli.doc)?;
        }
        Commands::Append { items } => {
            let root = cli.root.ok_or("Store directory required for append")?;
            commands::append::run(&root, &cli.doc, &items)?;
        }
        Commands::Watch { poll_timeout } => {
            let root = cli.root.ok_or("Store directory required for watch")?;
            commands::watch::run(&root, &cli.doc, poll_timeout)?;
        }
        Commands::Version => {
            println!("jotsync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
