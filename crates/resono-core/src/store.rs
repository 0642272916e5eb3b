//! Fingerprint store contract and the in-memory reference implementation.
//!
//! The store is a pure posting list over hashes plus recording metadata; it
//! makes no judgment about matching. The matcher and the engine depend only
//! on the [`FingerprintStore`] trait, never on a concrete backend.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::fingerprint::Fingerprint;

/// Largest number of fingerprints written per store call / transaction.
pub const INSERT_BATCH: usize = 1000;
/// Largest number of probe hashes per lookup chunk.
pub const LOOKUP_BATCH: usize = 100;

/// A recording known to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recording {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Duration in seconds, when known.
    pub duration: Option<f64>,
    /// Opaque reference to the source (path or blob id).
    pub source_ref: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata for a recording about to be ingested.
#[derive(Debug, Clone, Default)]
pub struct NewRecording {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<f64>,
    pub source_ref: String,
}

/// One stored hit returned by [`FingerprintStore::lookup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting {
    pub recording_id: i64,
    pub time_offset: f64,
    pub hash: u32,
}

/// Analytics row for one identification attempt. Recording it must never
/// fail the user operation.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub audio_duration: f64,
    pub identified_recording_id: Option<i64>,
    pub confidence: Option<f64>,
    pub processing_time_ms: f64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub recording_count: u64,
    pub fingerprint_count: u64,
    pub query_count: u64,
    pub successful_query_count: u64,
    pub average_processing_time_ms: f64,
}

/// Posting-list storage for fingerprints plus recording metadata.
///
/// A freshly inserted recording stays invisible to `lookup` and
/// `recording` until `mark_ready`: identification never observes a
/// half-persisted recording, and a failed or cancelled ingestion is erased
/// with a plain `delete_recording`.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Create the recording row; returns its id. Not yet queryable.
    async fn insert_recording(&self, recording: &NewRecording) -> Result<i64>;

    /// Append fingerprints for a recording. Implementations write in chunks
    /// of at most [`INSERT_BATCH`] rows and never hold the entire list in
    /// one transaction. Duplicate `(recording_id, hash, time_offset)` rows
    /// are tolerated, so a retried batch must not fail.
    async fn insert_fingerprints(
        &self,
        recording_id: i64,
        fingerprints: &[Fingerprint],
    ) -> Result<()>;

    /// Flip the recording to ready; it becomes queryable atomically.
    async fn mark_ready(&self, recording_id: i64) -> Result<()>;

    /// Every stored posting whose hash is in `hashes`. Callers pass distinct
    /// hashes; implementations probe in chunks of at most [`LOOKUP_BATCH`]
    /// and concatenate the results.
    async fn lookup(&self, hashes: &[u32]) -> Result<Vec<Posting>>;

    /// Fetch a ready recording by id.
    async fn recording(&self, recording_id: i64) -> Result<Option<Recording>>;

    /// Remove a recording and cascade all of its fingerprints, ready or not.
    async fn delete_recording(&self, recording_id: i64) -> Result<()>;

    /// Append one analytics row.
    async fn record_query(&self, record: &QueryRecord) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

struct StoredRecording {
    recording: Recording,
    ready: bool,
    fingerprint_count: u64,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    recordings: HashMap<i64, StoredRecording>,
    /// hash -> (recording_id, time_offset) postings.
    index: HashMap<u32, Vec<(i64, f64)>>,
    queries: Vec<QueryRecord>,
}

/// Hash-multimap store for tests and small deployments.
///
/// One `RwLock` gives concurrent reads and serialized writes; every write
/// path takes the lock once, so readers see a recording's postings appear
/// atomically.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for MemoryStore {
    async fn insert_recording(&self, recording: &NewRecording) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.recordings.insert(
            id,
            StoredRecording {
                recording: Recording {
                    id,
                    title: recording.title.clone(),
                    artist: recording.artist.clone(),
                    album: recording.album.clone(),
                    duration: recording.duration,
                    source_ref: recording.source_ref.clone(),
                    created_at: Utc::now(),
                },
                ready: false,
                fingerprint_count: 0,
            },
        );
        Ok(id)
    }

    async fn insert_fingerprints(
        &self,
        recording_id: i64,
        fingerprints: &[Fingerprint],
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.recordings.contains_key(&recording_id) {
            bail!("unknown recording {recording_id}");
        }
        for batch in fingerprints.chunks(INSERT_BATCH) {
            for fp in batch {
                inner
                    .index
                    .entry(fp.hash)
                    .or_default()
                    .push((recording_id, fp.time_offset));
            }
            if let Some(stored) = inner.recordings.get_mut(&recording_id) {
                stored.fingerprint_count += batch.len() as u64;
            }
        }
        Ok(())
    }

    async fn mark_ready(&self, recording_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.recordings.get_mut(&recording_id) {
            Some(stored) => {
                stored.ready = true;
                Ok(())
            }
            None => bail!("unknown recording {recording_id}"),
        }
    }

    async fn lookup(&self, hashes: &[u32]) -> Result<Vec<Posting>> {
        let inner = self.inner.read().await;
        let mut postings = Vec::new();
        for chunk in hashes.chunks(LOOKUP_BATCH) {
            for &hash in chunk {
                let Some(entries) = inner.index.get(&hash) else {
                    continue;
                };
                for &(recording_id, time_offset) in entries {
                    let ready = inner
                        .recordings
                        .get(&recording_id)
                        .map(|stored| stored.ready)
                        .unwrap_or(false);
                    if ready {
                        postings.push(Posting {
                            recording_id,
                            time_offset,
                            hash,
                        });
                    }
                }
            }
        }
        Ok(postings)
    }

    async fn recording(&self, recording_id: i64) -> Result<Option<Recording>> {
        let inner = self.inner.read().await;
        Ok(inner
            .recordings
            .get(&recording_id)
            .filter(|stored| stored.ready)
            .map(|stored| stored.recording.clone()))
    }

    async fn delete_recording(&self, recording_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.recordings.remove(&recording_id);
        for entries in inner.index.values_mut() {
            entries.retain(|&(id, _)| id != recording_id);
        }
        inner.index.retain(|_, entries| !entries.is_empty());
        Ok(())
    }

    async fn record_query(&self, record: &QueryRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.queries.push(record.clone());
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read().await;
        let ready = || inner.recordings.values().filter(|stored| stored.ready);
        let query_count = inner.queries.len() as u64;
        let average_processing_time_ms = if inner.queries.is_empty() {
            0.0
        } else {
            inner
                .queries
                .iter()
                .map(|q| q.processing_time_ms)
                .sum::<f64>()
                / inner.queries.len() as f64
        };
        Ok(StoreStats {
            recording_count: ready().count() as u64,
            fingerprint_count: ready().map(|stored| stored.fingerprint_count).sum(),
            query_count,
            successful_query_count: inner
                .queries
                .iter()
                .filter(|q| q.identified_recording_id.is_some())
                .count() as u64,
            average_processing_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(hash: u32, time_offset: f64) -> Fingerprint {
        Fingerprint { hash, time_offset }
    }

    fn meta(title: &str) -> NewRecording {
        NewRecording {
            title: title.to_string(),
            artist: "tester".to_string(),
            ..NewRecording::default()
        }
    }

    #[tokio::test]
    async fn postings_invisible_until_ready() {
        let store = MemoryStore::new();
        let id = store.insert_recording(&meta("a")).await.unwrap();
        store
            .insert_fingerprints(id, &[fp(7, 1.0), fp(9, 2.0)])
            .await
            .unwrap();

        assert!(store.lookup(&[7, 9]).await.unwrap().is_empty());
        assert!(store.recording(id).await.unwrap().is_none());

        store.mark_ready(id).await.unwrap();
        let postings = store.lookup(&[7, 9]).await.unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(store.recording(id).await.unwrap().unwrap().title, "a");
    }

    #[tokio::test]
    async fn lookup_returns_only_probed_hashes() {
        let store = MemoryStore::new();
        let id = store.insert_recording(&meta("a")).await.unwrap();
        store
            .insert_fingerprints(id, &[fp(1, 0.5), fp(2, 1.5), fp(3, 2.5)])
            .await
            .unwrap();
        store.mark_ready(id).await.unwrap();

        let postings = store.lookup(&[2]).await.unwrap();
        assert_eq!(postings, vec![Posting { recording_id: id, time_offset: 1.5, hash: 2 }]);
    }

    #[tokio::test]
    async fn lookup_accepts_more_hashes_than_one_chunk() {
        let store = MemoryStore::new();
        let id = store.insert_recording(&meta("a")).await.unwrap();
        let fingerprints: Vec<Fingerprint> =
            (0..500).map(|i| fp(i, i as f64 * 0.01)).collect();
        store.insert_fingerprints(id, &fingerprints).await.unwrap();
        store.mark_ready(id).await.unwrap();

        let hashes: Vec<u32> = (0..500).collect();
        assert_eq!(store.lookup(&hashes).await.unwrap().len(), 500);
    }

    #[tokio::test]
    async fn delete_cascades_fingerprints() {
        let store = MemoryStore::new();
        let keep = store.insert_recording(&meta("keep")).await.unwrap();
        let discard = store.insert_recording(&meta("discard")).await.unwrap();
        store.insert_fingerprints(keep, &[fp(42, 1.0)]).await.unwrap();
        store.insert_fingerprints(discard, &[fp(42, 9.0)]).await.unwrap();
        store.mark_ready(keep).await.unwrap();
        store.mark_ready(discard).await.unwrap();

        store.delete_recording(discard).await.unwrap();

        let postings = store.lookup(&[42]).await.unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].recording_id, keep);
        assert!(store.recording(discard).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_recording_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert_fingerprints(99, &[fp(1, 0.0)]).await.is_err());
        assert!(store.mark_ready(99).await.is_err());
    }

    #[tokio::test]
    async fn stats_aggregate_queries_and_ready_recordings() {
        let store = MemoryStore::new();
        let ready = store.insert_recording(&meta("ready")).await.unwrap();
        store.insert_fingerprints(ready, &[fp(1, 0.0), fp(2, 1.0)]).await.unwrap();
        store.mark_ready(ready).await.unwrap();
        // Never marked ready: not part of the stats.
        let _pending = store.insert_recording(&meta("pending")).await.unwrap();

        store
            .record_query(&QueryRecord {
                audio_duration: 10.0,
                identified_recording_id: Some(ready),
                confidence: Some(0.8),
                processing_time_ms: 120.0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .record_query(&QueryRecord {
                audio_duration: 8.0,
                identified_recording_id: None,
                confidence: None,
                processing_time_ms: 80.0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.recording_count, 1);
        assert_eq!(stats.fingerprint_count, 2);
        assert_eq!(stats.query_count, 2);
        assert_eq!(stats.successful_query_count, 1);
        assert!((stats.average_processing_time_ms - 100.0).abs() < 1e-9);
    }
}
