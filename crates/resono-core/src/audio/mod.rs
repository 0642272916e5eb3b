//! Audio decoding and resampling.
//!
//! Pure-Rust decoders for WAV, MP3, FLAC and OGG Vorbis, all funneled into
//! mono f32 samples at the pipeline rate.

mod decoder;
mod resample;

pub use decoder::{decode_audio, decode_pipeline_input, AudioData};
pub use resample::resample_to_target;

use std::path::Path;

/// Supported audio containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    Unknown,
}

impl AudioFormat {
    /// Detect format from the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") => AudioFormat::Ogg,
            _ => AudioFormat::Unknown,
        }
    }
}
