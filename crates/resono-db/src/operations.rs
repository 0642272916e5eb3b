//! Parameterized queries behind the store trait.

use anyhow::{Context, Result};
use resono_core::store::{INSERT_BATCH, LOOKUP_BATCH};
use resono_core::{Fingerprint, NewRecording, Posting, QueryRecord, Recording, StoreStats};

use crate::connection::DbPool;
use crate::models::{posting_from_row, recording_from_row, stats_from_row, JsonFingerprint};

pub(crate) async fn insert_recording(pool: &DbPool, recording: &NewRecording) -> Result<i64> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "INSERT INTO recordings (title, artist, album, duration, source_ref)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
            &[
                &recording.title,
                &recording.artist,
                &recording.album,
                &recording.duration,
                &recording.source_ref,
            ],
        )
        .await
        .context("failed to insert recording")?;
    Ok(row.get(0))
}

/// Batch insert through one JSONB parameter per chunk. Each chunk is its own
/// statement, so a recording's fingerprints never sit in one big transaction.
pub(crate) async fn insert_fingerprints(
    pool: &DbPool,
    recording_id: i64,
    fingerprints: &[Fingerprint],
) -> Result<()> {
    if fingerprints.is_empty() {
        return Ok(());
    }
    let client = pool.get().await?;

    for chunk in fingerprints.chunks(INSERT_BATCH) {
        let rows: Vec<JsonFingerprint> = chunk
            .iter()
            .map(|fp| JsonFingerprint {
                hash: fp.hash as i64,
                time_offset: fp.time_offset,
            })
            .collect();
        let json = serde_json::to_value(&rows).context("failed to serialize fingerprints")?;

        client
            .execute(
                "INSERT INTO fingerprints (recording_id, hash, time_offset)
                 SELECT $1, (fp->>'hash')::BIGINT, (fp->>'time_offset')::DOUBLE PRECISION
                 FROM jsonb_array_elements($2::jsonb) AS fp",
                &[&recording_id, &json],
            )
            .await
            .context("failed to batch insert fingerprints")?;
    }
    Ok(())
}

pub(crate) async fn mark_ready(pool: &DbPool, recording_id: i64) -> Result<()> {
    let client = pool.get().await?;
    let updated = client
        .execute(
            "UPDATE recordings SET ready = TRUE WHERE id = $1",
            &[&recording_id],
        )
        .await
        .context("failed to mark recording ready")?;
    if updated == 0 {
        anyhow::bail!("unknown recording {recording_id}");
    }
    Ok(())
}

/// Postings for every probed hash, chunked to [`LOOKUP_BATCH`] probes per
/// statement. The hash index makes each chunk O(probes + hits).
pub(crate) async fn lookup_hashes(pool: &DbPool, hashes: &[u32]) -> Result<Vec<Posting>> {
    let client = pool.get().await?;
    let mut postings = Vec::new();

    for chunk in hashes.chunks(LOOKUP_BATCH) {
        let probes: Vec<i64> = chunk.iter().map(|&h| h as i64).collect();
        let rows = client
            .query(
                "SELECT f.recording_id, f.time_offset, f.hash
                 FROM fingerprints f
                 JOIN recordings r ON r.id = f.recording_id
                 WHERE r.ready AND f.hash = ANY($1)",
                &[&probes],
            )
            .await
            .context("failed to look up fingerprint hashes")?;
        postings.extend(rows.iter().map(posting_from_row));
    }
    Ok(postings)
}

pub(crate) async fn get_recording(pool: &DbPool, recording_id: i64) -> Result<Option<Recording>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT id, title, artist, album, duration, source_ref, created_at
             FROM recordings
             WHERE id = $1 AND ready",
            &[&recording_id],
        )
        .await
        .context("failed to fetch recording")?;
    Ok(row.as_ref().map(recording_from_row))
}

/// `ON DELETE CASCADE` on the fingerprints table does the heavy lifting.
pub(crate) async fn delete_recording(pool: &DbPool, recording_id: i64) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute("DELETE FROM recordings WHERE id = $1", &[&recording_id])
        .await
        .context("failed to delete recording")?;
    Ok(())
}

pub(crate) async fn insert_query_record(pool: &DbPool, record: &QueryRecord) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "INSERT INTO queries
                 (audio_duration, identified_recording_id, confidence,
                  processing_time_ms, created_at)
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &record.audio_duration,
                &record.identified_recording_id,
                &record.confidence,
                &record.processing_time_ms,
                &record.created_at,
            ],
        )
        .await
        .context("failed to record query")?;
    Ok(())
}

pub(crate) async fn fetch_stats(pool: &DbPool) -> Result<StoreStats> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT
                (SELECT COUNT(*) FROM recordings WHERE ready),
                (SELECT COUNT(*) FROM fingerprints f
                    JOIN recordings r ON r.id = f.recording_id WHERE r.ready),
                (SELECT COUNT(*) FROM queries),
                (SELECT COUNT(*) FROM queries WHERE identified_recording_id IS NOT NULL),
                (SELECT COALESCE(AVG(processing_time_ms), 0.0) FROM queries)",
            &[],
        )
        .await
        .context("failed to aggregate store stats")?;
    Ok(stats_from_row(&row))
}
