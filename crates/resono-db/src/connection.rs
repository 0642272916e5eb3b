//! Database connection management.

use anyhow::{Context, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use resono_core::PostgresqlConfig;
use tokio_postgres::NoTls;

pub type DbPool = Pool;

/// Build a PostgreSQL connection pool sized by `max_connections`.
pub fn create_pool(config: &PostgresqlConfig) -> Result<DbPool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.database.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.pool = Some(PoolConfig::new(config.max_connections.max(1) as usize));
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .with_context(|| {
            format!(
                "failed to build connection pool for {}:{}/{}",
                config.host, config.port, config.database
            )
        })
}

/// Check out one connection and confirm the server answers.
pub async fn test_connection(pool: &DbPool) -> Result<()> {
    let client = pool
        .get()
        .await
        .context("failed to check out a database connection")?;
    let row = client
        .query_one("SELECT current_database()", &[])
        .await
        .context("connection self-test query failed")?;
    let database: String = row.get(0);
    log::debug!("connected to database {database}");
    Ok(())
}
