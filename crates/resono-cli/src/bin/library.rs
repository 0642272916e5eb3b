//! library - admin surface over the persistent fingerprint store.
//!
//! Usage: library stats | library delete <id>

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use resono_cli::output::print_json;
use resono_cli::{build_store, load_config};
use resono_core::{FingerprintStore, StorageBackendKind};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "library")]
#[command(about = "Inspect and administer the fingerprint library", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print library counters
    Stats,
    /// Delete a recording and all of its fingerprints
    Delete {
        /// Recording id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Warn)
            .init();
    }

    let config = load_config(args.config.as_deref())?;
    if config.storage.backend != StorageBackendKind::Postgresql {
        anyhow::bail!("library administration needs the postgresql backend");
    }
    let store = build_store(&config).await?;

    match args.command {
        Command::Stats => {
            let stats = store.stats().await?;
            print_json(&stats);
        }
        Command::Delete { id } => {
            store.delete_recording(id).await?;
            print_json(&json!({ "status": "deleted", "recording_id": id }));
        }
    }

    Ok(())
}
