//! [`FingerprintStore`] implementation over the connection pool.

use anyhow::Result;
use async_trait::async_trait;
use resono_core::{
    Fingerprint, FingerprintStore, NewRecording, Posting, PostgresqlConfig, QueryRecord,
    Recording, StoreStats,
};

use crate::connection::{create_pool, test_connection, DbPool};
use crate::operations;
use crate::schema::init_schema;

/// PostgreSQL-backed fingerprint store.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Build a pool, verify connectivity and ensure the schema exists.
    pub async fn connect(config: &PostgresqlConfig) -> Result<Self> {
        let pool = create_pool(config)?;
        test_connection(&pool).await?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl FingerprintStore for PgStore {
    async fn insert_recording(&self, recording: &NewRecording) -> Result<i64> {
        operations::insert_recording(&self.pool, recording).await
    }

    async fn insert_fingerprints(
        &self,
        recording_id: i64,
        fingerprints: &[Fingerprint],
    ) -> Result<()> {
        operations::insert_fingerprints(&self.pool, recording_id, fingerprints).await
    }

    async fn mark_ready(&self, recording_id: i64) -> Result<()> {
        operations::mark_ready(&self.pool, recording_id).await
    }

    async fn lookup(&self, hashes: &[u32]) -> Result<Vec<Posting>> {
        operations::lookup_hashes(&self.pool, hashes).await
    }

    async fn recording(&self, recording_id: i64) -> Result<Option<Recording>> {
        operations::get_recording(&self.pool, recording_id).await
    }

    async fn delete_recording(&self, recording_id: i64) -> Result<()> {
        operations::delete_recording(&self.pool, recording_id).await
    }

    async fn record_query(&self, record: &QueryRecord) -> Result<()> {
        operations::insert_query_record(&self.pool, record).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        operations::fetch_stats(&self.pool).await
    }
}
