//! Shared glue for the resono binaries: config loading, store selection,
//! and JSON output.

pub mod output;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use resono_core::{FingerprintStore, MemoryStore, ResonoConfig, StorageBackendKind};
use resono_db::PgStore;

/// Load configuration: an explicit path must parse; otherwise `config.toml`
/// in the working directory is used when present, and defaults apply last.
pub fn load_config(explicit: Option<&Path>) -> Result<ResonoConfig> {
    if let Some(path) = explicit {
        return ResonoConfig::load(path);
    }
    let fallback = Path::new("config.toml");
    if fallback.exists() {
        match ResonoConfig::load(fallback) {
            Ok(config) => return Ok(config),
            Err(e) => log::warn!("ignoring unreadable config.toml: {e:#}"),
        }
    }
    Ok(ResonoConfig::default())
}

/// Build the configured store backend.
pub async fn build_store(config: &ResonoConfig) -> Result<Arc<dyn FingerprintStore>> {
    match config.storage.backend {
        StorageBackendKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackendKind::Postgresql => {
            let store = PgStore::connect(&config.storage.postgresql).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_explicit_config_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/resono.toml"))).is_err());
    }
}
