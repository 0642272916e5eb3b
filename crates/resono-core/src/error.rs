//! Error kinds for the fingerprinting and identification pipeline.

use thiserror::Error;

/// Failures surfaced by the engine and the DSP pipeline.
///
/// "No match" is not represented here: an identification that passes all the
/// way through but finds no candidate is a normal outcome, reported as `None`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input is shorter than one analysis window.
    #[error("audio too short: {0} samples, need at least one analysis window")]
    InputTooShort(usize),

    /// The source's container or codec is not one we decode.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The source decoded but yielded no audio samples.
    #[error("no audio stream in source")]
    NoAudioStream,

    /// The decoder failed partway through the source.
    #[error("failed to decode audio: {0}")]
    DecodeFailed(String),

    /// The pipeline ran to completion but produced zero hashes.
    /// Usually silence or a degenerate input.
    #[error("audio produced no fingerprints")]
    NoFingerprints,

    /// The fingerprint store rejected or could not serve an operation.
    #[error("fingerprint store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),

    /// Identification exceeded its wall-clock budget.
    #[error("identification exceeded the {0} ms budget")]
    Timeout(u64),

    /// The ingestion was cancelled before reaching the ready state.
    #[error("ingestion cancelled")]
    Cancelled,

    /// A background compute task died (panic or runtime shutdown).
    #[error("background task failed: {0}")]
    Task(String),
}
