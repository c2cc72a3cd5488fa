//! Ordered, keyed in-memory set of records.

use std::collections::{BTreeMap, HashMap};

use crate::error::StorageResult;
use crate::record::Record;

/// In-memory cache of records.
///
/// Records are keyed by `id` if present, else `cid`, and can also be found
/// through their `cid` once they have been given a server `id`. Iteration
/// follows insertion order; replacing a record keeps its position.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: BTreeMap<u64, Record>,
    index: HashMap<String, u64>,
    next_seq: u64,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from records in order. Later duplicates replace
    /// earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> StorageResult<Self> {
        let mut collection = Self::new();
        for record in records {
            collection.insert(record)?;
        }
        Ok(collection)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&Record> {
        self.index
            .get(identifier)
            .and_then(|seq| self.records.get(seq))
    }

    /// Canonical key of the record named by `identifier`.
    pub fn resolve(&self, identifier: &str) -> Option<String> {
        self.get(identifier).and_then(Record::key)
    }

    /// Inserts or replaces a record. Returns the previous version.
    ///
    /// A record carrying an `id` replaces the entry stored under its `cid`,
    /// so syncing a record re-keys it instead of duplicating it.
    pub fn insert(&mut self, record: Record) -> StorageResult<Option<Record>> {
        let key = record.require_key()?;

        let existing = self
            .index
            .get(&key)
            .or_else(|| record.cid().and_then(|cid| self.index.get(&cid)))
            .copied();

        let (seq, previous) = match existing {
            Some(seq) => {
                let previous = self.records.remove(&seq);
                if let Some(old) = &previous {
                    self.unindex(old);
                }
                (seq, previous)
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                (seq, None)
            }
        };

        self.index.insert(key.clone(), seq);
        if let Some(cid) = record.cid() {
            self.index.entry(cid).or_insert(seq);
        }
        self.records.insert(seq, record);

        Ok(previous)
    }

    /// Removes the record named by `identifier`.
    pub fn remove(&mut self, identifier: &str) -> Option<Record> {
        let seq = self.index.get(identifier).copied()?;
        let record = self.records.remove(&seq)?;
        self.unindex(&record);
        Some(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn to_vec(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    fn unindex(&mut self, record: &Record) {
        for identifier in [record.key(), record.cid()].into_iter().flatten() {
            self.index.remove(&identifier);
        }
    }
}
