//! Operational configuration, loaded from TOML.
//!
//! Only operational knobs live here: which store backend to talk to, how the
//! ingest pool behaves, and the identification budget. The DSP parameters
//! (window, hop, quantization, thresholds) are fixed constants in their own
//! modules; making them configurable would silently fork the hash space.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResonoConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub identify: IdentifyConfig,
}

/// Store backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    #[serde(default)]
    pub postgresql: PostgresqlConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            postgresql: PostgresqlConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Memory,
    Postgresql,
}

/// PostgreSQL connection parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresqlConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for PostgresqlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_database() -> String {
    "resono".to_string()
}
fn default_user() -> String {
    "resono".to_string()
}
fn default_password() -> String {
    "resono".to_string()
}
fn default_max_connections() -> u32 {
    10
}

/// Ingestion worker pool and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Concurrent end-to-end ingestion pipelines.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Attempts per fingerprint batch before the recording fails.
    #[serde(default = "default_max_store_attempts")]
    pub max_store_attempts: u32,
    /// Base delay of the exponential backoff between attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_store_attempts: default_max_store_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_worker_count() -> usize {
    2
}
fn default_max_store_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}

/// Identification budget.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentifyConfig {
    /// Soft wall-clock budget for one identification.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ResonoConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        let config: ResonoConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse TOML config: {e}"))?;
        Ok(config)
    }

    /// PostgreSQL connection URL, when that backend is selected.
    pub fn connection_string(&self) -> Option<String> {
        match self.storage.backend {
            StorageBackendKind::Postgresql => {
                let pg = &self.storage.postgresql;
                Some(format!(
                    "postgresql://{}:{}@{}:{}/{}",
                    pg.user, pg.password, pg.host, pg.port, pg.database
                ))
            }
            StorageBackendKind::Memory => None,
        }
    }
}
