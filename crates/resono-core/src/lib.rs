//! Resono core - constellation-map audio identification.
//!
//! Turns audio into sparse spectral-peak fingerprints, stores them as an
//! inverted hash index, and identifies short clips by histogram-voting on
//! the temporal offsets at which query hashes collide with stored hashes.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod matching;
pub mod pairs;
pub mod peaks;
pub mod spectrogram;
pub mod store;

pub use config::{PostgresqlConfig, ResonoConfig, StorageBackendKind};
pub use engine::{Engine, Identification};
pub use error::EngineError;
pub use fingerprint::{fingerprint_samples, Fingerprint};
pub use ingest::{IngestJob, IngestQueue, IngestSource};
pub use matching::{MatchOutcome, Matcher};
pub use peaks::Peak;
pub use spectrogram::{Spectrogram, SAMPLE_RATE};
pub use store::{
    FingerprintStore, MemoryStore, NewRecording, Posting, QueryRecord, Recording, StoreStats,
};
