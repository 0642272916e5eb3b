//! Constellation extraction: sparse spectral peaks from the magnitude matrix.

use rayon::prelude::*;

use crate::spectrogram::Spectrogram;

/// Minimum magnitude for a cell to be considered at all.
pub const MAGNITUDE_FLOOR: f32 = 15.0;
/// Side length of the square local-maximum neighborhood, in bins.
pub const NEIGHBORHOOD: usize = 20;
/// Hard cap on peaks kept per recording.
pub const MAX_PEAKS: usize = 10_000;

/// A local maximum of the spectrogram, in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub frequency: f64,
    pub time: f64,
    pub magnitude: f32,
}

/// Extract the constellation map of `spectrogram`.
///
/// A cell survives if its magnitude reaches [`MAGNITUDE_FLOOR`] and it is a
/// strict local maximum of the closed `NEIGHBORHOOD x NEIGHBORHOOD` square
/// centered on it: every neighbor strictly less, an equal neighbor
/// disqualifies (kills duplicate peaks on plateaus). Cells beyond the matrix
/// edge are absent, not zero, so a ridge running into the edge can still win.
///
/// At most [`MAX_PEAKS`] peaks are kept, greatest magnitude first; the
/// result is ordered by time, then frequency.
pub fn extract_peaks(spectrogram: &Spectrogram) -> Vec<Peak> {
    let num_frames = spectrogram.num_frames();
    let num_bins = spectrogram.num_bins();

    let mut peaks: Vec<Peak> = (0..num_frames)
        .into_par_iter()
        .flat_map_iter(|t| {
            let mut row = Vec::new();
            for f in 0..num_bins {
                let magnitude = spectrogram.magnitude(t, f);
                if magnitude < MAGNITUDE_FLOOR {
                    continue;
                }
                if is_strict_maximum(spectrogram, t, f, magnitude) {
                    row.push(Peak {
                        frequency: Spectrogram::bin_frequency(f),
                        time: Spectrogram::frame_time(t),
                        magnitude,
                    });
                }
            }
            row.into_iter()
        })
        .collect();

    cap_peaks(&mut peaks, MAX_PEAKS);

    peaks.sort_unstable_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then(a.frequency.total_cmp(&b.frequency))
    });
    peaks
}

fn is_strict_maximum(spectrogram: &Spectrogram, t: usize, f: usize, center: f32) -> bool {
    let half = NEIGHBORHOOD / 2;
    let t_lo = t.saturating_sub(half);
    let t_hi = (t + half).min(spectrogram.num_frames() - 1);
    let f_lo = f.saturating_sub(half);
    let f_hi = (f + half).min(spectrogram.num_bins() - 1);

    for ti in t_lo..=t_hi {
        for fi in f_lo..=f_hi {
            if ti == t && fi == f {
                continue;
            }
            if spectrogram.magnitude(ti, fi) >= center {
                return false;
            }
        }
    }
    true
}

/// Keep the `cap` peaks of greatest magnitude; ties broken by earliest time,
/// then lowest frequency.
fn cap_peaks(peaks: &mut Vec<Peak>, cap: usize) {
    if peaks.len() <= cap {
        return;
    }
    peaks.sort_unstable_by(|a, b| {
        b.magnitude
            .total_cmp(&a.magnitude)
            .then(a.time.total_cmp(&b.time))
            .then(a.frequency.total_cmp(&b.frequency))
    });
    peaks.truncate(cap);
}
