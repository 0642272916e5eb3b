//! Anchor-target peak pairing and the pair hash.

use crate::fingerprint::Fingerprint;
use crate::peaks::Peak;

/// Smallest anchor-to-target gap that forms a pair, in seconds.
pub const PAIR_DT_MIN: f64 = 0.5;
/// Largest anchor-to-target gap that forms a pair, in seconds.
pub const PAIR_DT_MAX: f64 = 3.0;
/// Maximum number of targets paired with one anchor.
pub const FANOUT: usize = 3;

/// Pair each peak (anchor) with up to [`FANOUT`] later peaks (targets) whose
/// time gap falls inside `[PAIR_DT_MIN, PAIR_DT_MAX]`.
///
/// `peaks` must be sorted by time ascending, as delivered by the peak
/// picker; the scan stops at the first target past `PAIR_DT_MAX`. Emitted
/// fingerprints carry the anchor time, so the output is in non-decreasing
/// time order.
pub fn pair_fingerprints(peaks: &[Peak]) -> Vec<Fingerprint> {
    let mut fingerprints = Vec::new();

    for (i, anchor) in peaks.iter().enumerate() {
        let mut emitted = 0;
        for target in &peaks[i + 1..] {
            let delta_t = target.time - anchor.time;
            if delta_t < PAIR_DT_MIN {
                continue;
            }
            if delta_t > PAIR_DT_MAX {
                break;
            }
            fingerprints.push(Fingerprint {
                hash: pair_hash(anchor.frequency, target.frequency, delta_t),
                time_offset: anchor.time,
            });
            emitted += 1;
            if emitted == FANOUT {
                break;
            }
        }
    }

    fingerprints
}

/// Hash of one anchor-target pair.
///
/// Frequencies quantize to 10 Hz bins, the gap to centiseconds scaled to
/// milliseconds, and the three fields combine with the 31-polynomial roll
/// in wrapping u32 arithmetic:
///
/// ```text
/// q1 = floor(f_anchor / 10) * 10
/// q2 = floor(f_target / 10) * 10
/// qd = floor(dt * 100) * 10
/// h  = (q1 * 31 + q2) * 31 + qd        (mod 2^32)
/// ```
///
/// Stores widen the result losslessly to 64 bits; the function itself is
/// the compatibility contract and must not change.
pub fn pair_hash(anchor_freq: f64, target_freq: f64, delta_t: f64) -> u32 {
    let q1 = (anchor_freq / 10.0).floor() as u32 * 10;
    let q2 = (target_freq / 10.0).floor() as u32 * 10;
    let qd = (delta_t * 100.0).floor() as u32 * 10;

    q1.wrapping_mul(31)
        .wrapping_add(q2)
        .wrapping_mul(31)
        .wrapping_add(qd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(time: f64, frequency: f64) -> Peak {
        Peak {
            frequency,
            time,
            magnitude: 30.0,
        }
    }

    #[test]
    fn known_hash_value() {
        // (1000 * 31 + 990) * 31 + 750
        assert_eq!(pair_hash(1000.0, 990.0, 0.75), 992_440);
        // All-zero quantized fields collapse to zero.
        assert_eq!(pair_hash(9.9, 9.9, 0.009), 0);
    }

    #[test]
    fn hash_is_invariant_inside_quantization_bins() {
        let reference = pair_hash(1000.0, 2000.0, 0.75);
        assert_eq!(pair_hash(1009.9, 2000.0, 0.75), reference);
        assert_eq!(pair_hash(1000.0, 2009.9, 0.75), reference);
        assert_eq!(pair_hash(1000.0, 2000.0, 0.7599), reference);
    }

    #[test]
    fn hash_changes_across_bin_boundaries() {
        let reference = pair_hash(1000.0, 2000.0, 0.75);
        assert_ne!(pair_hash(1010.0, 2000.0, 0.75), reference);
        assert_ne!(pair_hash(1000.0, 1990.0, 0.75), reference);
        assert_ne!(pair_hash(1000.0, 2000.0, 0.76), reference);
    }

    #[test]
    fn gap_window_and_fanout() {
        let peaks = vec![
            peak(0.0, 1000.0),
            peak(0.3, 1100.0), // too close to the first anchor
            peak(0.6, 1200.0),
            peak(1.2, 1300.0),
            peak(2.0, 1400.0),
            peak(2.9, 1500.0), // fourth valid target of anchor 0: over fanout
            peak(3.6, 1600.0), // past PAIR_DT_MAX for anchor 0
        ];
        let fingerprints = pair_fingerprints(&peaks);

        let from_first: Vec<_> = fingerprints
            .iter()
            .filter(|fp| fp.time_offset == 0.0)
            .collect();
        assert_eq!(from_first.len(), FANOUT);
        assert_eq!(
            from_first[0].hash,
            pair_hash(1000.0, 1200.0, 0.6)
        );
        assert_eq!(
            from_first[2].hash,
            pair_hash(1000.0, 1400.0, 2.0)
        );
    }

    #[test]
    fn time_offsets_are_non_decreasing() {
        let peaks: Vec<Peak> = (0..20).map(|i| peak(i as f64 * 0.6, 500.0 + i as f64)).collect();
        let fingerprints = pair_fingerprints(&peaks);
        assert!(!fingerprints.is_empty());
        assert!(fingerprints
            .windows(2)
            .all(|w| w[0].time_offset <= w[1].time_offset));
    }

    #[test]
    fn lone_peak_yields_nothing() {
        assert!(pair_fingerprints(&[peak(1.0, 800.0)]).is_empty());
    }
}
