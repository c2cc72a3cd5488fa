//! Ephemeral in-memory backend.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::Backend;
use crate::collection::Collection;
use crate::error::{StorageError, StorageResult};
use crate::record::Record;

/// Backend holding records in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<Collection>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, identifier: &str) -> StorageResult<Record> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(identifier)
            .cloned()
            .ok_or_else(|| StorageError::not_found(identifier))
    }

    async fn set(&self, record: &Record) -> StorageResult<Record> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.clone())?;
        Ok(record.clone())
    }

    async fn remove(&self, identifier: &str) -> StorageResult<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records
            .remove(identifier)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(identifier))
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.clear();
        Ok(())
    }

    async fn get_all(&self) -> StorageResult<Vec<Record>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.to_vec())
    }

    async fn size(&self) -> StorageResult<usize> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.len())
    }
}
