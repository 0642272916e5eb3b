//! Embedded schema for the three fingerprint tables.

use anyhow::{Context, Result};

use crate::connection::DbPool;

/// Idempotent DDL. `fingerprints.hash` is a BIGINT holding the 32-bit hash
/// with the high bits zero; a recording stays invisible to lookups until
/// its `ready` flag flips.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS recordings (
    id          BIGSERIAL PRIMARY KEY,
    title       TEXT NOT NULL,
    artist      TEXT NOT NULL,
    album       TEXT,
    duration    DOUBLE PRECISION,
    source_ref  TEXT NOT NULL,
    ready       BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS fingerprints (
    recording_id  BIGINT NOT NULL REFERENCES recordings(id) ON DELETE CASCADE,
    hash          BIGINT NOT NULL,
    time_offset   DOUBLE PRECISION NOT NULL
);

CREATE INDEX IF NOT EXISTS fingerprints_hash_idx
    ON fingerprints (hash);
CREATE INDEX IF NOT EXISTS fingerprints_recording_time_idx
    ON fingerprints (recording_id, time_offset);

CREATE TABLE IF NOT EXISTS queries (
    id                        BIGSERIAL PRIMARY KEY,
    audio_duration            DOUBLE PRECISION NOT NULL,
    identified_recording_id   BIGINT REFERENCES recordings(id) ON DELETE SET NULL,
    confidence                DOUBLE PRECISION,
    processing_time_ms        DOUBLE PRECISION NOT NULL,
    created_at                TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

/// Create tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &DbPool) -> Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(SCHEMA)
        .await
        .context("failed to initialize database schema")?;
    Ok(())
}
