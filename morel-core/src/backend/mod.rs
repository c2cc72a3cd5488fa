//! Backend adapters: the raw persistence primitive beneath a storage.
//!
//! Two variants implement [`Backend`]:
//! - [`MemoryBackend`]: process memory, lost on restart
//! - [`SqliteBackend`]: durable SQLite database
//!
//! The variant is chosen from a [`BackendConfig`] when a storage is opened.

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::record::Record;

/// Raw key-value persistence for one logical store.
///
/// Identifiers may be a record's key or its `cid`. Setting a record that
/// carries an `id` supersedes any entry stored under its `cid`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetches a record, or `NotFound`.
    async fn get(&self, identifier: &str) -> StorageResult<Record>;

    /// Stores a record, returning what was stored.
    async fn set(&self, record: &Record) -> StorageResult<Record>;

    /// Removes a record, or `NotFound`.
    async fn remove(&self, identifier: &str) -> StorageResult<()>;

    /// Removes every record. Succeeds on an empty store.
    async fn clear(&self) -> StorageResult<()>;

    /// All records in insertion order.
    async fn get_all(&self) -> StorageResult<Vec<Record>>;

    async fn size(&self) -> StorageResult<usize>;
}

/// Backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Ephemeral in-process storage.
    #[default]
    Memory,
    /// Durable SQLite database at `path`.
    Sqlite { path: PathBuf },
}

impl BackendConfig {
    /// Returns true if data survives a restart.
    pub fn is_durable(&self) -> bool {
        matches!(self, BackendConfig::Sqlite { .. })
    }
}

/// Opens the configured backend for the store called `name`.
///
/// For SQLite this opens the database and creates the schema; it completes
/// before the backend is handed out.
pub async fn connect(config: &BackendConfig, name: &str) -> StorageResult<Arc<dyn Backend>> {
    match config {
        BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendConfig::Sqlite { path } => {
            let backend = SqliteBackend::open(path, name).await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backend_config_yaml_shape() {
        let config: BackendConfig = serde_json::from_str(r#"{"type": "memory"}"#).unwrap();
        assert_eq!(config, BackendConfig::Memory);

        let config: BackendConfig =
            serde_json::from_str(r#"{"type": "sqlite", "path": "/tmp/morel.db"}"#).unwrap();
        assert!(config.is_durable());
    }

    #[tokio::test]
    async fn test_connect_selects_variant() {
        let temp_dir = TempDir::new().unwrap();
        let sqlite = BackendConfig::Sqlite {
            path: temp_dir.path().join("morel.db"),
        };

        for config in [BackendConfig::Memory, sqlite] {
            let backend = connect(&config, "samples").await.unwrap();
            backend.set(&Record::with_cid("abc")).await.unwrap();
            assert_eq!(backend.size().await.unwrap(), 1);
        }
    }
}
