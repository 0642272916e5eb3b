//! Ingestion and identification orchestration.
//!
//! The engine owns the seam between pure compute and store I/O: the DSP
//! pipeline runs to completion on a blocking worker, while store batches and
//! lookups are the only await points. Cancellation is honored at those
//! boundaries, and a recording that fails (or is cancelled) before reaching
//! the ready state is erased from the store.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::audio::decode_pipeline_input;
use crate::config::{IdentifyConfig, IngestConfig};
use crate::error::EngineError;
use crate::fingerprint::{fingerprint_samples, Fingerprint};
use crate::matching::{MatchOutcome, Matcher};
use crate::spectrogram::SAMPLE_RATE;
use crate::store::{FingerprintStore, NewRecording, QueryRecord, StoreStats, INSERT_BATCH};

/// Result of one identification pass. `outcome` is `None` for a clean
/// no-match; timings are milliseconds everywhere.
#[derive(Debug, Clone, Serialize)]
pub struct Identification {
    pub outcome: Option<MatchOutcome>,
    pub query_fingerprints: usize,
    pub processing_time_ms: f64,
}

/// Fingerprinting engine over any [`FingerprintStore`].
pub struct Engine {
    store: Arc<dyn FingerprintStore>,
    ingest: IngestConfig,
    identify: IdentifyConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self::with_config(store, IngestConfig::default(), IdentifyConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn FingerprintStore>,
        ingest: IngestConfig,
        identify: IdentifyConfig,
    ) -> Self {
        Self {
            store,
            ingest,
            identify,
        }
    }

    /// Decode and ingest an audio file; returns the ready recording id.
    pub async fn add_file(
        &self,
        recording: NewRecording,
        path: &Path,
    ) -> Result<i64, EngineError> {
        self.add_file_with_cancel(recording, path, &CancellationToken::new())
            .await
    }

    pub async fn add_file_with_cancel(
        &self,
        mut recording: NewRecording,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<i64, EngineError> {
        let owned = path.to_path_buf();
        let audio = tokio::task::spawn_blocking(move || decode_pipeline_input(&owned))
            .await
            .map_err(task_error)??;

        if recording.source_ref.is_empty() {
            recording.source_ref = path.display().to_string();
        }
        self.add_samples_with_cancel(recording, audio.samples, cancel)
            .await
    }

    /// Ingest already-decoded pipeline-rate mono samples.
    pub async fn add_samples(
        &self,
        recording: NewRecording,
        samples: Vec<f32>,
    ) -> Result<i64, EngineError> {
        self.add_samples_with_cancel(recording, samples, &CancellationToken::new())
            .await
    }

    pub async fn add_samples_with_cancel(
        &self,
        mut recording: NewRecording,
        samples: Vec<f32>,
        cancel: &CancellationToken,
    ) -> Result<i64, EngineError> {
        if recording.duration.is_none() {
            recording.duration = Some(samples.len() as f64 / SAMPLE_RATE as f64);
        }

        let fingerprints = tokio::task::spawn_blocking(move || fingerprint_samples(&samples))
            .await
            .map_err(task_error)??;
        if fingerprints.is_empty() {
            return Err(EngineError::NoFingerprints);
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let recording_id = self
            .store
            .insert_recording(&recording)
            .await
            .map_err(EngineError::StoreUnavailable)?;

        match self.persist(recording_id, &fingerprints, cancel).await {
            Ok(()) => {
                log::info!(
                    "recording {recording_id} ready: {} fingerprints ({})",
                    fingerprints.len(),
                    recording.title
                );
                Ok(recording_id)
            }
            Err(e) => {
                // The store must keep no trace of a failed or cancelled
                // ingestion attempt.
                if let Err(cleanup) = self.store.delete_recording(recording_id).await {
                    log::error!(
                        "failed to erase recording {recording_id} after aborted ingest: {cleanup:#}"
                    );
                }
                Err(e)
            }
        }
    }

    async fn persist(
        &self,
        recording_id: i64,
        fingerprints: &[Fingerprint],
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        for batch in fingerprints.chunks(INSERT_BATCH) {
            self.write_batch(recording_id, batch, cancel).await?;
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.store
            .mark_ready(recording_id)
            .await
            .map_err(EngineError::StoreUnavailable)
    }

    /// Write one batch, retrying store failures with exponential backoff.
    async fn write_batch(
        &self,
        recording_id: i64,
        batch: &[Fingerprint],
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.store.insert_fingerprints(recording_id, batch).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.ingest.max_store_attempts {
                        return Err(EngineError::StoreUnavailable(e));
                    }
                    let delay = Duration::from_millis(
                        self.ingest.retry_backoff_ms.saturating_mul(1 << (attempt - 1)),
                    );
                    log::warn!(
                        "batch write for recording {recording_id} failed (attempt {attempt}): \
                         {e:#}; retrying in {delay:?}"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    }
                }
            }
        }
    }

    /// Decode and identify a clip.
    pub async fn identify_file(&self, path: &Path) -> Result<Identification, EngineError> {
        let owned = path.to_path_buf();
        let audio = tokio::task::spawn_blocking(move || decode_pipeline_input(&owned))
            .await
            .map_err(task_error)??;
        self.identify_samples(audio.samples).await
    }

    /// Identify already-decoded pipeline-rate mono samples.
    ///
    /// Enforces the soft wall-clock budget and records one analytics row for
    /// every completed or timed-out attempt; analytics failures are logged
    /// and swallowed.
    pub async fn identify_samples(
        &self,
        samples: Vec<f32>,
    ) -> Result<Identification, EngineError> {
        let started = Instant::now();
        let audio_duration = samples.len() as f64 / SAMPLE_RATE as f64;
        let budget = Duration::from_millis(self.identify.timeout_ms);

        match tokio::time::timeout(budget, self.identify_inner(samples)).await {
            Err(_) => {
                self.log_query(audio_duration, None, elapsed_ms(started)).await;
                Err(EngineError::Timeout(self.identify.timeout_ms))
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok((outcome, query_fingerprints))) => {
                let processing_time_ms = elapsed_ms(started);
                self.log_query(audio_duration, outcome.as_ref(), processing_time_ms)
                    .await;
                Ok(Identification {
                    outcome,
                    query_fingerprints,
                    processing_time_ms,
                })
            }
        }
    }

    async fn identify_inner(
        &self,
        samples: Vec<f32>,
    ) -> Result<(Option<MatchOutcome>, usize), EngineError> {
        let fingerprints = tokio::task::spawn_blocking(move || fingerprint_samples(&samples))
            .await
            .map_err(task_error)??;
        if fingerprints.is_empty() {
            return Err(EngineError::NoFingerprints);
        }

        let outcome = Matcher::new(self.store.as_ref())
            .best_match(&fingerprints)
            .await
            .map_err(EngineError::StoreUnavailable)?;
        Ok((outcome, fingerprints.len()))
    }

    async fn log_query(
        &self,
        audio_duration: f64,
        outcome: Option<&MatchOutcome>,
        processing_time_ms: f64,
    ) {
        let record = QueryRecord {
            audio_duration,
            identified_recording_id: outcome.map(|o| o.recording_id),
            confidence: outcome.map(|o| o.confidence),
            processing_time_ms,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_query(&record).await {
            log::warn!("failed to record query analytics: {e:#}");
        }
    }

    /// Remove a recording and all of its fingerprints.
    pub async fn delete(&self, recording_id: i64) -> Result<(), EngineError> {
        self.store
            .delete_recording(recording_id)
            .await
            .map_err(EngineError::StoreUnavailable)
    }

    pub async fn stats(&self) -> Result<StoreStats, EngineError> {
        self.store.stats().await.map_err(EngineError::StoreUnavailable)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn task_error(e: tokio::task::JoinError) -> EngineError {
    EngineError::Task(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Posting, Recording};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn meta(title: &str) -> NewRecording {
        NewRecording {
            title: title.to_string(),
            artist: "tester".to_string(),
            ..NewRecording::default()
        }
    }

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

    fn fast_ingest(max_store_attempts: u32) -> IngestConfig {
        IngestConfig {
            worker_count: 2,
            max_store_attempts,
            retry_backoff_ms: 1,
        }
    }

    /// Store wrapper whose fingerprint writes fail a set number of times.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicU32,
        write_attempts: AtomicU32,
        deletes: AtomicU32,
    }

    impl FlakyStore {
        fn failing(times: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures_left: AtomicU32::new(times),
                write_attempts: AtomicU32::new(0),
                deletes: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl FingerprintStore for FlakyStore {
        async fn insert_recording(&self, recording: &NewRecording) -> Result<i64> {
            self.inner.insert_recording(recording).await
        }

        async fn insert_fingerprints(
            &self,
            recording_id: i64,
            fingerprints: &[Fingerprint],
        ) -> Result<()> {
            self.write_attempts.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                bail!("injected store failure");
            }
            self.inner.insert_fingerprints(recording_id, fingerprints).await
        }

        async fn mark_ready(&self, recording_id: i64) -> Result<()> {
            self.inner.mark_ready(recording_id).await
        }

        async fn lookup(&self, hashes: &[u32]) -> Result<Vec<Posting>> {
            self.inner.lookup(hashes).await
        }

        async fn recording(&self, recording_id: i64) -> Result<Option<Recording>> {
            self.inner.recording(recording_id).await
        }

        async fn delete_recording(&self, recording_id: i64) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_recording(recording_id).await
        }

        async fn record_query(&self, record: &QueryRecord) -> Result<()> {
            self.inner.record_query(record).await
        }

        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn silence_is_rejected_with_no_fingerprints() {
        let engine = Engine::new(Arc::new(MemoryStore::new()));
        let silence = vec![0.0f32; SAMPLE_RATE as usize * 10];

        let added = engine.add_samples(meta("silence"), silence.clone()).await;
        assert!(matches!(added, Err(EngineError::NoFingerprints)));

        let identified = engine.identify_samples(silence).await;
        assert!(matches!(identified, Err(EngineError::NoFingerprints)));

        // Nothing was persisted and no analytics row was written.
        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.recording_count, 0);
        assert_eq!(stats.query_count, 0);
    }

    #[tokio::test]
    async fn transient_store_failure_is_retried() {
        let store = Arc::new(FlakyStore::failing(2));
        let engine = Engine::with_config(
            store.clone(),
            fast_ingest(3),
            IdentifyConfig::default(),
        );

        let id = engine
            .add_samples(meta("retry"), two_tone_sequence(6))
            .await
            .unwrap();

        assert!(store.recording(id).await.unwrap().is_some());
        // Two failures plus the successful attempt on the first batch.
        assert!(store.write_attempts.load(Ordering::SeqCst) >= 3);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_erase_the_recording() {
        let store = Arc::new(FlakyStore::failing(u32::MAX));
        let engine = Engine::with_config(
            store.clone(),
            fast_ingest(3),
            IdentifyConfig::default(),
        );

        let result = engine.add_samples(meta("doomed"), two_tone_sequence(6)).await;
        assert!(matches!(result, Err(EngineError::StoreUnavailable(_))));
        assert_eq!(store.write_attempts.load(Ordering::SeqCst), 3);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats().await.unwrap().recording_count, 0);
    }

    #[tokio::test]
    async fn cancelled_ingest_leaves_no_trace() {
        let store = Arc::new(FlakyStore::failing(0));
        let engine = Engine::new(store.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine
            .add_samples_with_cancel(meta("cancelled"), two_tone_sequence(6), &cancel)
            .await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(store.stats().await.unwrap().recording_count, 0);
    }

    #[tokio::test]
    async fn blown_budget_reports_timeout_and_logs_the_query() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::with_config(
            store.clone(),
            IngestConfig::default(),
            IdentifyConfig { timeout_ms: 1 },
        );

        let result = engine.identify_samples(two_tone_sequence(10)).await;
        assert!(matches!(result, Err(EngineError::Timeout(1))));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.query_count, 1);
        assert_eq!(stats.successful_query_count, 0);
    }

    #[tokio::test]
    async fn duration_is_derived_from_the_samples() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(store.clone());

        let id = engine
            .add_samples(meta("timed"), two_tone_sequence(6))
            .await
            .unwrap();

        let recording = store.recording(id).await.unwrap().unwrap();
        assert!((recording.duration.unwrap() - 6.0).abs() < 0.01);
    }
}
