//! Wire format for the remote server.
//!
//! ## Submission
//!
//! ```text
//! POST {url}
//! { appname, appsecret, website_id, survey_id,
//!   submission: { collection, cid, id?, attributes, children: [submission] } }
//! -> 2xx { id, server_on?, children: [{ cid, id }] }
//! ```
//!
//! ## Deletion
//!
//! ```text
//! DELETE {url}
//! { appname, appsecret, website_id, survey_id,
//!   deletion: { collection, id, cid } }
//! -> 2xx
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};
use crate::models::Metadata;
use crate::record::{Record, CID, ID, METADATA};

/// Attribute holding nested occurrence records.
pub const CHILDREN: &str = "occurrences";
/// Collection name sent for nested children.
pub const CHILD_COLLECTION: &str = "occurrences";

const ATTRIBUTES: &str = "attributes";

/// A record as sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub collection: String,
    pub cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Submission>,
}

impl Submission {
    /// Builds the submission for a stored record.
    ///
    /// Attributes come from the record's `attributes` object when it has
    /// one; otherwise every field except identifiers, metadata and children
    /// is sent.
    pub fn from_record(collection: &str, record: &Record) -> StorageResult<Self> {
        let cid = record
            .cid()
            .ok_or_else(|| StorageError::validation("record has no cid to submit"))?;

        let attributes = match record.get(ATTRIBUTES) {
            Some(Value::Object(map)) => map.clone(),
            _ => record
                .attributes()
                .iter()
                .filter(|(name, _)| ![ID, CID, METADATA, CHILDREN].contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        };

        let children = match record.get(CHILDREN) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    let child = Record::try_from(item.clone())?;
                    Submission::from_record(CHILD_COLLECTION, &child)
                })
                .collect::<StorageResult<Vec<_>>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            collection: collection.to_string(),
            cid,
            id: record.get(ID).filter(|id| !id.is_null()).cloned(),
            attributes,
            children,
        })
    }
}

/// Server acknowledgment of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Value,
    #[serde(default)]
    pub server_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub children: Vec<ChildReceipt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildReceipt {
    pub cid: String,
    pub id: Value,
}

/// A request to delete a synced record on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deletion {
    pub collection: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

impl Deletion {
    /// Returns `None` for records the server has never seen.
    pub fn from_record(collection: &str, record: &Record) -> Option<Self> {
        let id = record.get(ID).filter(|id| !id.is_null())?.clone();
        Some(Self {
            collection: collection.to_string(),
            id,
            cid: record.cid(),
        })
    }
}

/// Copies server ids into the record and stamps it as synced at `synced_on`.
pub fn apply_receipt(record: &mut Record, receipt: &Receipt, synced_on: DateTime<Utc>) {
    let server_on = receipt.server_on.unwrap_or(synced_on);
    record.set(ID, receipt.id.clone());
    stamp_synced(record.attributes_mut(), synced_on, server_on);

    if let Some(Value::Array(children)) = record.get_mut(CHILDREN) {
        for child in children.iter_mut().filter_map(Value::as_object_mut) {
            let cid = child.get(CID).and_then(Value::as_str).map(str::to_string);
            let Some(cid) = cid else { continue };

            if let Some(ack) = receipt.children.iter().find(|ack| ack.cid == cid) {
                child.insert(ID.to_string(), ack.id.clone());
                stamp_synced(child, synced_on, server_on);
            }
        }
    }
}

fn stamp_synced(map: &mut Map<String, Value>, synced_on: DateTime<Utc>, server_on: DateTime<Utc>) {
    let metadata = map
        .entry(METADATA)
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Value::Object(metadata) = metadata {
        metadata
            .entry("created_on")
            .or_insert_with(|| Value::String(synced_on.to_rfc3339()));
        metadata
            .entry("updated_on")
            .or_insert_with(|| Value::String(synced_on.to_rfc3339()));
        metadata.insert("synced_on".into(), Value::String(synced_on.to_rfc3339()));
        metadata.insert("server_on".into(), Value::String(server_on.to_rfc3339()));
    }
}

fn metadata_of(value: Option<&Value>) -> Option<Metadata> {
    value.and_then(|value| serde_json::from_value(value.clone()).ok())
}

/// True if the record, or any nested child, has changes the server lacks.
///
/// Records without readable metadata count as pending.
pub fn is_pending(record: &Record) -> bool {
    let own = metadata_of(record.get(METADATA)).map_or(true, |m| m.is_pending());
    if own {
        return true;
    }

    match record.get(CHILDREN) {
        Some(Value::Array(children)) => children
            .iter()
            .any(|child| metadata_of(child.get(METADATA)).map_or(true, |m| m.is_pending())),
        _ => false,
    }
}

/// Latest `updated_on` of the record and its children.
pub fn last_updated(record: &Record) -> Option<DateTime<Utc>> {
    let children = match record.get(CHILDREN) {
        Some(Value::Array(children)) => children.as_slice(),
        _ => &[],
    };

    std::iter::once(record.get(METADATA))
        .chain(children.iter().map(|child| child.get(METADATA)))
        .filter_map(metadata_of)
        .map(|metadata| metadata.updated_on)
        .max()
}

/// True if the record is waiting for its remote deletion.
pub fn is_marked_deleted(record: &Record) -> bool {
    record
        .get(METADATA)
        .and_then(|metadata| metadata.get("deleted"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Flags the record for remote deletion.
pub fn mark_deleted(record: &mut Record) {
    let map = record.attributes_mut();
    let metadata = map
        .entry(METADATA)
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Value::Object(metadata) = metadata {
        metadata.insert("deleted".into(), Value::Bool(true));
    }
}
