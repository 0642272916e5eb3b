//! ingest - add audio files to the fingerprint library.
//!
//! Usage: ingest <audio>... [--artist NAME] [--config FILE]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use resono_cli::output::{print_json, IngestReport};
use resono_cli::{build_store, load_config};
use resono_core::{Engine, IngestJob, IngestQueue, IngestSource, NewRecording, StorageBackendKind};
use tokio::task::JoinSet;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Fingerprint audio files and add them to the library", long_about = None)]
struct Args {
    /// Audio files to ingest (wav, mp3, flac, ogg)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Recording title; only honored for a single input file
    #[arg(long)]
    title: Option<String>,

    /// Recording artist
    #[arg(long, default_value = "unknown")]
    artist: String,

    /// Recording album
    #[arg(long)]
    album: Option<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
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
        anyhow::bail!(
            "ingest needs a persistent backend; select `backend = \"postgresql\"` in the config"
        );
    }

    let store = build_store(&config).await?;
    let engine = Arc::new(Engine::with_config(
        store,
        config.ingest.clone(),
        config.identify.clone(),
    ));
    let queue = Arc::new(IngestQueue::start(engine, config.ingest.worker_count));

    if args.title.is_some() && args.files.len() > 1 {
        log::warn!("--title ignored: multiple input files use their file names");
    }

    let mut jobs = JoinSet::new();
    for path in &args.files {
        let title = match (&args.title, args.files.len()) {
            (Some(title), 1) => title.clone(),
            _ => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };
        let job = IngestJob {
            recording: NewRecording {
                title,
                artist: args.artist.clone(),
                album: args.album.clone(),
                duration: None,
                source_ref: path.display().to_string(),
            },
            source: IngestSource::File(path.clone()),
        };
        let queue = queue.clone();
        let source = path.display().to_string();
        jobs.spawn(async move {
            match queue.submit(job).await {
                Ok(id) => IngestReport::ready(source, id),
                Err(e) => IngestReport::failed(source, e.to_string()),
            }
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => log::error!("ingest task panicked: {e}"),
        }
    }
    reports.sort_by(|a, b| a.source.cmp(&b.source));

    if let Ok(queue) = Arc::try_unwrap(queue) {
        queue.shutdown().await;
    }

    print_json(&reports);
    Ok(())
}
