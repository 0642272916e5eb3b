//! identify - match a short clip against the fingerprint library.
//!
//! Usage: identify <clip> [--library DIR | --config FILE]
//!
//! With `--library`, the given directory of audio files is fingerprinted
//! into an in-memory store first and the clip is matched against that;
//! otherwise the configured PostgreSQL library is queried.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use resono_cli::output::{print_json, IdentifyReport};
use resono_cli::{build_store, load_config};
use resono_core::audio::AudioFormat;
use resono_core::{
    Engine, FingerprintStore, IngestJob, IngestQueue, IngestSource, MemoryStore, NewRecording,
    ResonoConfig, StorageBackendKind,
};
use tokio::task::JoinSet;

#[derive(Parser, Debug)]
#[command(name = "identify")]
#[command(about = "Identify a short audio clip", long_about = None)]
struct Args {
    /// The clip to identify (wav, mp3, flac, ogg)
    query: PathBuf,

    /// Build an ad-hoc in-memory library from this directory of audio files
    #[arg(short, long)]
    library: Option<PathBuf>,

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

    let (store, engine): (Arc<dyn FingerprintStore>, Arc<Engine>) = match &args.library {
        Some(dir) => {
            let store: Arc<dyn FingerprintStore> = Arc::new(MemoryStore::new());
            let engine = Arc::new(Engine::with_config(
                store.clone(),
                config.ingest.clone(),
                config.identify.clone(),
            ));
            ingest_directory(dir, engine.clone(), &config).await?;
            (store, engine)
        }
        None => {
            if config.storage.backend != StorageBackendKind::Postgresql {
                anyhow::bail!(
                    "no library to search: pass --library <dir> or configure \
                     `backend = \"postgresql\"`"
                );
            }
            let store = build_store(&config).await?;
            let engine = Arc::new(Engine::with_config(
                store.clone(),
                config.ingest.clone(),
                config.identify.clone(),
            ));
            (store, engine)
        }
    };

    let identification = engine
        .identify_file(&args.query)
        .await
        .with_context(|| format!("failed to identify {}", args.query.display()))?;

    let recording = match &identification.outcome {
        Some(outcome) => store.recording(outcome.recording_id).await.ok().flatten(),
        None => None,
    };

    print_json(&IdentifyReport::from_identification(&identification, recording));
    Ok(())
}

/// Fingerprint every supported audio file in `dir` through the worker pool.
async fn ingest_directory(dir: &Path, engine: Arc<Engine>, config: &ResonoConfig) -> Result<()> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read library directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| AudioFormat::from_path(path) != AudioFormat::Unknown)
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("no audio files in {}", dir.display());
    }
    log::info!("building in-memory library from {} files", files.len());

    let queue = Arc::new(IngestQueue::start(engine, config.ingest.worker_count));
    let mut jobs = JoinSet::new();
    for path in files {
        let queue = queue.clone();
        jobs.spawn(async move {
            let title = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let result = queue
                .submit(IngestJob {
                    recording: NewRecording {
                        title,
                        artist: "library".to_string(),
                        album: None,
                        duration: None,
                        source_ref: path.display().to_string(),
                    },
                    source: IngestSource::File(path.clone()),
                })
                .await;
            (path, result)
        });
    }

    let mut loaded = 0usize;
    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok((_, Ok(_))) => loaded += 1,
            Ok((path, Err(e))) => log::warn!("skipping {}: {e}", path.display()),
            Err(e) => log::error!("library task panicked: {e}"),
        }
    }
    if let Ok(queue) = Arc::try_unwrap(queue) {
        queue.shutdown().await;
    }

    if loaded == 0 {
        anyhow::bail!("no library file could be fingerprinted");
    }
    log::info!("library ready: {loaded} recordings");
    Ok(())
}
