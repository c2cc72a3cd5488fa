//! Records: JSON objects identified by a server `id` or a client `cid`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};

/// Attribute holding the server-assigned identifier.
pub const ID: &str = "id";
/// Attribute holding the client-generated identifier.
pub const CID: &str = "cid";
/// Attribute holding sync metadata.
pub const METADATA: &str = "metadata";

/// A single stored observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record (no identifier yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record with only a client identifier.
    pub fn with_cid(cid: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.set(CID, cid.into());
        record
    }

    /// Serializes a model into a record.
    ///
    /// Fails with a validation error if the model cannot be serialized or
    /// does not serialize to a JSON object.
    pub fn from_model<T: Serialize>(model: &T) -> StorageResult<Self> {
        let value = serde_json::to_value(model)
            .map_err(|e| StorageError::validation(format!("cannot serialize record: {}", e)))?;
        Self::try_from(value)
    }

    /// Deserializes the record into a model.
    pub fn to_model<T: DeserializeOwned>(&self) -> StorageResult<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| StorageError::validation(format!("cannot deserialize record: {}", e)))
    }

    /// Server identifier, rendered as a string.
    pub fn id(&self) -> Option<String> {
        self.0.get(ID).and_then(identifier_string)
    }

    /// Client identifier.
    pub fn cid(&self) -> Option<String> {
        self.0.get(CID).and_then(identifier_string)
    }

    /// Collection key: `id` when present, else `cid`.
    pub fn key(&self) -> Option<String> {
        self.id().or_else(|| self.cid())
    }

    /// Like [`Record::key`] but fails with a validation error.
    pub fn require_key(&self) -> StorageResult<String> {
        self.key()
            .ok_or_else(|| StorageError::validation("record has neither id nor cid"))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.0.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl TryFrom<Value> for Record {
    type Error = StorageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Record(map)),
            other => Err(StorageError::validation(format!(
                "record must be an object, got {}",
                other
            ))),
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

/// Anything that names a record: a raw identifier or the record itself.
pub trait Identify {
    fn identifier(&self) -> StorageResult<String>;
}

impl Identify for str {
    fn identifier(&self) -> StorageResult<String> {
        if self.is_empty() {
            return Err(StorageError::validation("empty identifier"));
        }
        Ok(self.to_string())
    }
}

impl Identify for String {
    fn identifier(&self) -> StorageResult<String> {
        self.as_str().identifier()
    }
}

impl Identify for Record {
    fn identifier(&self) -> StorageResult<String> {
        self.require_key()
    }
}

impl<T: Identify + ?Sized> Identify for &T {
    fn identifier(&self) -> StorageResult<String> {
        (**self).identifier()
    }
}

/// Strings and integers are valid identifiers; empty strings are not.
fn identifier_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
