//! Temporal-alignment search over store postings.
//!
//! A true match produces many hash collisions at one `stored - query` time
//! delta (the clip's position inside the recording); accidental collisions
//! spread uniformly over deltas. Histogramming the deltas per candidate and
//! voting on the mode bin separates the two.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use crate::fingerprint::Fingerprint;
use crate::store::FingerprintStore;


/// Minimum raw collisions for a candidate to be considered, and minimum
/// collisions in the winning delta bin.
pub const MIN_MATCHES: usize = 5;
/// Minimum accepted `aligned / total` ratio.
pub const MIN_CONFIDENCE: f64 = 0.1;
/// Width of one delta histogram bin, in seconds.
pub const ALIGNMENT_TOLERANCE: f64 = 0.1;

/// The single best match for a query, with its scores.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub recording_id: i64,
    /// Fraction of the candidate's collisions that share the mode delta bin.
    pub confidence: f64,
    /// Collision count in the mode delta bin.
    pub aligned_matches: usize,
    /// Size of the query fingerprint set.
    pub query_fingerprints: usize,
    /// The mode delta: where the clip sits inside the recording, in seconds.
    pub offset_seconds: f64,
}

struct Candidate {
    recording_id: i64,
    confidence: f64,
    aligned: usize,
    combined: f64,
    offset_seconds: f64,
}

/// Histogram-vote matcher over any [`FingerprintStore`].
pub struct Matcher<'a> {
    store: &'a dyn FingerprintStore,
}

impl<'a> Matcher<'a> {
    pub fn new(store: &'a dyn FingerprintStore) -> Self {
        Self { store }
    }

    /// Choose the best recording for `query`, or `None` when no candidate
    /// passes the thresholds. Store failures propagate.
    pub async fn best_match(&self, query: &[Fingerprint]) -> Result<Option<MatchOutcome>> {
        if query.is_empty() {
            return Ok(None);
        }

        // A hash occurring several times in the query pairs every stored
        // posting with each of its query times.
        let mut query_times: HashMap<u32, Vec<f64>> = HashMap::new();
        for fp in query {
            query_times.entry(fp.hash).or_default().push(fp.time_offset);
        }
        let hashes: Vec<u32> = query_times.keys().copied().collect();

        let postings = self.store.lookup(&hashes).await?;

        let mut deltas: HashMap<i64, Vec<f64>> = HashMap::new();
        for posting in &postings {
            if let Some(times) = query_times.get(&posting.hash) {
                for &query_time in times {
                    deltas
                        .entry(posting.recording_id)
                        .or_default()
                        .push(posting.time_offset - query_time);
                }
            }
        }

        let candidates = score_candidates(deltas, query.len());

        if let Some(winner) = candidates.first() {
            log::debug!(
                "winner {}: aligned {}, confidence {:.3}, combined {:.4}, offset {:.1}s",
                winner.recording_id,
                winner.aligned,
                winner.confidence,
                winner.combined,
                winner.offset_seconds
            );
        }

        Ok(candidates.into_iter().next().map(|c| MatchOutcome {
            recording_id: c.recording_id,
            confidence: c.confidence,
            aligned_matches: c.aligned,
            query_fingerprints: query.len(),
            offset_seconds: c.offset_seconds,
        }))
    }
}

/// Score every delta group that clears the thresholds and rank the
/// survivors: highest combined score first, ties by greatest aligned count,
/// then smallest recording id.
fn score_candidates(deltas: HashMap<i64, Vec<f64>>, query_len: usize) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (recording_id, group) in deltas {
        let total = group.len();
        if total < MIN_MATCHES {
            log::trace!("candidate {recording_id}: only {total} raw collisions, skipping");
            continue;
        }

        let mut histogram: HashMap<i64, usize> = HashMap::new();
        for &delta in &group {
            let bin = (delta / ALIGNMENT_TOLERANCE).round() as i64;
            *histogram.entry(bin).or_insert(0) += 1;
        }
        // Mode bin; an exact tie goes to the smaller bin so the result
        // does not depend on map iteration order.
        let (mode_bin, aligned) = histogram
            .iter()
            .max_by(|(bin_a, count_a), (bin_b, count_b)| {
                count_a.cmp(count_b).then(bin_b.cmp(bin_a))
            })
            .map(|(&bin, &count)| (bin, count))
            .unwrap_or((0, 0));

        let confidence = aligned as f64 / total as f64;
        if aligned < MIN_MATCHES || confidence < MIN_CONFIDENCE {
            log::trace!("candidate {recording_id}: aligned {aligned}/{total} below thresholds");
            continue;
        }

        candidates.push(Candidate {
            recording_id,
            confidence,
            aligned,
            combined: confidence * aligned as f64 / query_len as f64,
            offset_seconds: mode_bin as f64 * ALIGNMENT_TOLERANCE,
        });
    }

    candidates.sort_by(|a, b| {
        b.combined
            .total_cmp(&a.combined)
            .then(b.aligned.cmp(&a.aligned))
            .then(a.recording_id.cmp(&b.recording_id))
    });
    candidates
}
