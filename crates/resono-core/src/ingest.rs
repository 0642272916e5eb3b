//! Bounded ingestion worker pool.
//!
//! Ingestions run end-to-end on a fixed number of workers pulled from one
//! queue; each worker owns a full decode + fingerprint + persist pipeline
//! for the job it holds. Shutdown cancels the shared token, which the
//! engine honors at its I/O boundaries.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::store::NewRecording;

/// Jobs waiting beyond the active workers before `submit` backpressures.
const QUEUE_CAPACITY: usize = 32;

/// Audio to ingest: a file on disk, or samples already decoded to
/// pipeline-rate mono (tests, in-process libraries).
#[derive(Debug)]
pub enum IngestSource {
    File(PathBuf),
    Samples(Vec<f32>),
}

/// One queued ingestion.
#[derive(Debug)]
pub struct IngestJob {
    pub recording: NewRecording,
    pub source: IngestSource,
}

struct QueuedJob {
    job: IngestJob,
    reply: oneshot::Sender<Result<i64, EngineError>>,
}

/// Handle to a running pool of ingestion workers.
pub struct IngestQueue {
    tx: mpsc::Sender<QueuedJob>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl IngestQueue {
    /// Spawn `worker_count` workers (from the engine's ingest config) over a
    /// shared queue.
    pub fn start(engine: Arc<Engine>, worker_count: usize) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedJob>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();

        let workers = (0..worker_count.max(1))
            .map(|worker| {
                let engine = engine.clone();
                let rx = rx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    log::debug!("ingest worker {worker} up");
                    loop {
                        let queued = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            queued = async { rx.lock().await.recv().await } => queued,
                        };
                        let Some(QueuedJob { job, reply }) = queued else {
                            break; // queue closed
                        };
                        let title = job.recording.title.clone();
                        let result = run_job(&engine, job, &shutdown).await;
                        if let Err(e) = &result {
                            log::warn!("ingest of '{title}' failed: {e}");
                        }
                        // The submitter may have walked away; that is fine.
                        let _ = reply.send(result);
                    }
                    log::debug!("ingest worker {worker} down");
                })
            })
            .collect();

        Self {
            tx,
            shutdown,
            workers,
        }
    }

    /// Queue one ingestion and wait for its outcome.
    pub async fn submit(&self, job: IngestJob) -> Result<i64, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueuedJob {
                job,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::Cancelled)?;
        reply_rx.await.map_err(|_| EngineError::Cancelled)?
    }

    /// Cancel in-flight work and wait for the workers to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        drop(self.tx);
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }
}

async fn run_job(
    engine: &Engine,
    job: IngestJob,
    cancel: &CancellationToken,
) -> Result<i64, EngineError> {
    match job.source {
        IngestSource::File(path) => {
            engine
                .add_file_with_cancel(job.recording, &path, cancel)
                .await
        }
        IngestSource::Samples(samples) => {
            engine
                .add_samples_with_cancel(job.recording, samples, cancel)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrogram::SAMPLE_RATE;
    use crate::store::{FingerprintStore, MemoryStore};

    fn meta(title: &str) -> NewRecording {
        NewRecording {
            title: title.to_string(),
            artist: "tester".to_string(),
            ..NewRecording::default()
        }
    }

    fn tone(freq: f64, seconds: usize) -> Vec<f32> {
        let mut samples = Vec::with_capacity(seconds * SAMPLE_RATE as usize);
        for second in 0..seconds {
            let f = freq + (second * 61 % 500) as f64;
            for i in 0..SAMPLE_RATE as usize {
                let t = i as f64 / SAMPLE_RATE as f64;
                samples.push((0.5 * (2.0 * std::f64::consts::PI * f * t).sin()) as f32);
            }
        }
        samples
    }

    #[tokio::test]
    async fn pool_processes_queued_jobs() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(Engine::new(store.clone()));
        let queue = IngestQueue::start(engine, 2);

        let mut ids = Vec::new();
        for i in 0..4 {
            let id = queue
                .submit(IngestJob {
                    recording: meta(&format!("track {i}")),
                    source: IngestSource::Samples(tone(300.0 + i as f64 * 111.0, 6)),
                })
                .await
                .unwrap();
            ids.push(id);
        }
        queue.shutdown().await;

        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
        assert_eq!(store.stats().await.unwrap().recording_count, 4);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(Engine::new(store));
        let queue = IngestQueue::start(engine.clone(), 1);

        queue.shutdown.cancel();
        // Workers are gone; the reply channel is dropped unanswered.
        let result = queue
            .submit(IngestJob {
                recording: meta("late"),
                source: IngestSource::Samples(tone(440.0, 6)),
            })
            .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn bad_job_fails_without_poisoning_the_pool() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(Engine::new(store.clone()));
        let queue = IngestQueue::start(engine, 1);

        let silent = queue
            .submit(IngestJob {
                recording: meta("silence"),
                source: IngestSource::Samples(vec![0.0; SAMPLE_RATE as usize * 6]),
            })
            .await;
        assert!(matches!(silent, Err(EngineError::NoFingerprints)));

        let good = queue
            .submit(IngestJob {
                recording: meta("tone"),
                source: IngestSource::Samples(tone(523.0, 6)),
            })
            .await;
        assert!(good.is_ok());

        queue.shutdown().await;
        assert_eq!(store.stats().await.unwrap().recording_count, 1);
    }
}
