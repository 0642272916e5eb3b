//! The fingerprint record and the full audio-to-fingerprints pipeline.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::pairs::pair_fingerprints;
use crate::peaks::extract_peaks;
use crate::spectrogram::compute_spectrogram;

/// One `(hash, time_offset)` record.
///
/// `hash` is computed in 32-bit unsigned arithmetic and widened to 64 bits
/// by the store; `time_offset` is the anchor time in seconds from the start
/// of the recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: u32,
    pub time_offset: f64,
}

/// Run the whole DSP pipeline over mono samples at the pipeline rate:
/// spectrogram, constellation extraction, pair hashing.
///
/// Pure compute; deterministic for identical input. The spectrogram and
/// peak list live only for the duration of this call.
pub fn fingerprint_samples(samples: &[f32]) -> Result<Vec<Fingerprint>, EngineError> {
    let spectrogram = compute_spectrogram(samples)?;
    let peaks = extract_peaks(&spectrogram);
    Ok(pair_fingerprints(&peaks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrogram::SAMPLE_RATE;

    fn two_tone_sequence(seconds: usize) -> Vec<f32> {
        let mut samples = Vec::with_capacity(seconds * SAMPLE_RATE as usize);
        for second in 0..seconds {
            let f1 = 300.0 + (second * 37 % 900) as f64;
            let f2 = 1400.0 + (second * 53 % 700) as f64;
            for i in 0..SAMPLE_RATE as usize {
                let t = i as f64 / SAMPLE_RATE as f64;
                let v = 0.4 * (2.0 * std::f64::consts::PI * f1 * t).sin()
                    + 0.4 * (2.0 * std::f64::consts::PI * f2 * t).sin();
                samples.push(v as f32);
            }
        }
        samples
    }

    #[test]
    fn tonal_audio_produces_fingerprints() {
        let fingerprints = fingerprint_samples(&two_tone_sequence(10)).unwrap();
        assert!(!fingerprints.is_empty());
        assert!(fingerprints.iter().all(|fp| fp.time_offset >= 0.0));
        assert!(fingerprints
            .windows(2)
            .all(|w| w[0].time_offset <= w[1].time_offset));
    }

    #[test]
    fn silence_produces_no_fingerprints() {
        let silence = vec![0.0f32; SAMPLE_RATE as usize * 10];
        assert!(fingerprint_samples(&silence).unwrap().is_empty());
    }

    #[test]
    fn fingerprinting_is_deterministic() {
        let samples = two_tone_sequence(8);
        let first = fingerprint_samples(&samples).unwrap();
        let second = fingerprint_samples(&samples).unwrap();
        assert_eq!(first, second);
    }
}
