use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::{Metadata, Model};
use crate::error::StorageResult;
use crate::record::Identify;

/// A single species observation, standalone or nested in a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub cid: Uuid,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Occurrence {
    pub fn new() -> Self {
        Self {
            id: None,
            cid: Uuid::new_v4(),
            attributes: Map::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
        self.metadata.touch();
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.attributes.remove(name);
        if removed.is_some() {
            self.metadata.touch();
        }
        removed
    }
}

impl Default for Occurrence {
    fn default() -> Self {
        Self::new()
    }
}

impl Identify for Occurrence {
    fn identifier(&self) -> StorageResult<String> {
        Ok(self
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| self.cid.to_string()))
    }
}

impl Model for Occurrence {
    const COLLECTION: &'static str = "occurrences";

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "Occurrence {} ({})", self.cid, id)?,
            None => write!(f, "Occurrence {}", self.cid)?,
        }
        for (name, value) in &self.attributes {
            write!(f, "\n  {}: {}", name, value)?;
        }
        Ok(())
    }
}
