//! Short-time Fourier transform of a mono sample stream.
//!
//! Produces the magnitude matrix the peak picker scans. The window, hop and
//! indexing conventions here are load-bearing: stored fingerprints are only
//! comparable with query fingerprints computed under the same conventions.

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

use crate::error::EngineError;

/// Sample rate every input must be resampled to before analysis.
pub const SAMPLE_RATE: u32 = 22050;
/// FFT window length in samples.
pub const WINDOW_SIZE: usize = 4096;
/// Samples between the starts of successive windows (75% overlap).
pub const HOP_SIZE: usize = 1024;
/// Retained non-redundant half of the FFT output.
pub const NUM_BINS: usize = WINDOW_SIZE / 2;

/// Magnitude time-frequency matrix, stored as one contiguous buffer
/// indexed `[t * NUM_BINS + f]`.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    magnitudes: Vec<f32>,
    num_frames: usize,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn num_bins(&self) -> usize {
        NUM_BINS
    }

    /// Magnitude at frame `t`, bin `f`.
    pub fn magnitude(&self, t: usize, f: usize) -> f32 {
        self.magnitudes[t * NUM_BINS + f]
    }

    /// All magnitudes of frame `t`.
    pub fn frame(&self, t: usize) -> &[f32] {
        &self.magnitudes[t * NUM_BINS..(t + 1) * NUM_BINS]
    }

    /// Time of frame `t` in seconds from the start of the signal.
    pub fn frame_time(t: usize) -> f64 {
        (t * HOP_SIZE) as f64 / SAMPLE_RATE as f64
    }

    /// Center frequency of bin `f` in Hz.
    ///
    /// Uses `f * SR / (2 * (bins - 1))`, not the canonical `f * SR / W`.
    /// A store built with this convention is only compatible with matchers
    /// using it; do not "fix" the denominator.
    pub fn bin_frequency(f: usize) -> f64 {
        f as f64 * SAMPLE_RATE as f64 / (2.0 * (NUM_BINS - 1) as f64)
    }

    #[cfg(test)]
    pub(crate) fn from_raw(magnitudes: Vec<f32>, num_frames: usize) -> Self {
        assert_eq!(magnitudes.len(), num_frames * NUM_BINS);
        Self {
            magnitudes,
            num_frames,
        }
    }
}

/// Compute the magnitude spectrogram of `samples`.
///
/// Emits `(len - WINDOW_SIZE) / HOP_SIZE + 1` frames; a window that would
/// extend past the end of the signal is dropped rather than zero-padded.
/// Frames carry no data dependency on each other, so the FFT stage fans out
/// per frame on the rayon pool.
pub fn compute_spectrogram(samples: &[f32]) -> Result<Spectrogram, EngineError> {
    if samples.len() < WINDOW_SIZE {
        return Err(EngineError::InputTooShort(samples.len()));
    }

    let num_frames = (samples.len() - WINDOW_SIZE) / HOP_SIZE + 1;
    let window = hann_window(WINDOW_SIZE);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(WINDOW_SIZE);
    let scratch_len = fft.get_inplace_scratch_len();

    let mut magnitudes = vec![0.0f32; num_frames * NUM_BINS];

    magnitudes
        .par_chunks_mut(NUM_BINS)
        .enumerate()
        .for_each_init(
            || {
                (
                    vec![Complex::new(0.0f32, 0.0); WINDOW_SIZE],
                    vec![Complex::new(0.0f32, 0.0); scratch_len],
                )
            },
            |(buffer, scratch), (t, out)| {
                let start = t * HOP_SIZE;
                for (n, slot) in buffer.iter_mut().enumerate() {
                    *slot = Complex::new(samples[start + n] * window[n], 0.0);
                }
                fft.process_with_scratch(buffer, scratch);
                for (f, slot) in out.iter_mut().enumerate() {
                    *slot = buffer[f].norm();
                }
            },
        );

    Ok(Spectrogram {
        magnitudes,
        num_frames,
    })
}

/// Hann window: `w[n] = 0.5 * (1 - cos(2 * pi * n / (W - 1)))`.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| {
            let x = n as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}
