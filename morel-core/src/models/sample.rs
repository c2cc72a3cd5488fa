use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::{Metadata, Model, Occurrence};
use crate::error::StorageResult;
use crate::record::Identify;

/// A survey visit: where and when, plus the occurrences recorded there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub cid: Uuid,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Sample {
    pub fn new() -> Self {
        Self {
            id: None,
            cid: Uuid::new_v4(),
            attributes: Map::new(),
            occurrences: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_occurrence(mut self, occurrence: Occurrence) -> Self {
        self.add_occurrence(occurrence);
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

    pub fn add_occurrence(&mut self, occurrence: Occurrence) {
        self.occurrences.push(occurrence);
        self.metadata.touch();
    }

    /// Removes the occurrence with the given client id.
    pub fn remove_occurrence(&mut self, cid: Uuid) -> Option<Occurrence> {
        let position = self.occurrences.iter().position(|o| o.cid == cid)?;
        self.metadata.touch();
        Some(self.occurrences.remove(position))
    }

    pub fn occurrence(&self, cid: Uuid) -> Option<&Occurrence> {
        self.occurrences.iter().find(|o| o.cid == cid)
    }
}

impl Default for Sample {
    fn default() -> Self {
        Self::new()
    }
}

impl Identify for Sample {
    fn identifier(&self) -> StorageResult<String> {
        Ok(self
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| self.cid.to_string()))
    }
}

impl Model for Sample {
    const COLLECTION: &'static str = "samples";

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// A sample is also pending when any nested occurrence changed.
    fn is_pending(&self) -> bool {
        self.metadata.is_pending() || self.occurrences.iter().any(|o| o.metadata.is_pending())
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => writeln!(f, "Sample {} (server id {})", self.cid, id)?,
            None => writeln!(f, "Sample {}", self.cid)?,
        }
        writeln!(f, "{}", "=".repeat(44))?;

        for (name, value) in &self.attributes {
            writeln!(f, "{}: {}", name, value)?;
        }

        if !self.occurrences.is_empty() {
            writeln!(f, "\nOccurrences:")?;
            for occurrence in &self.occurrences {
                writeln!(f, "  - {}", occurrence.cid)?;
            }
        }

        match self.metadata.synced_on {
            Some(synced_on) => writeln!(f, "\nSynced: {}", synced_on.format("%Y-%m-%d %H:%M"))?,
            None => writeln!(f, "\nSynced: never")?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[test]
    fn test_set_updates_metadata() {
        let mut sample = Sample::new();
        let before = sample.metadata.updated_on;
        sample.metadata.synced_on = Some(before + Duration::seconds(1));
        assert!(!sample.is_pending());

        sample.metadata.updated_on = before - Duration::seconds(10);
        sample.set("location", "SU 123 456");
        assert!(sample.metadata.updated_on > before - Duration::seconds(10));
        assert_eq!(sample.get("location"), Some(&json!("SU 123 456")));
    }

    #[test]
    fn test_pending_when_occurrence_changes() {
        let mut sample = Sample::new().with_occurrence(Occurrence::new());
        let later = Utc::now() + Duration::seconds(60);
        sample.metadata.synced_on = Some(later);
        sample.occurrences[0].metadata.synced_on = Some(later);
        assert!(!sample.is_pending());

        sample.occurrences[0].metadata.updated_on = later + Duration::seconds(1);
        assert!(sample.is_pending());
    }

    #[test]
    fn test_remove_occurrence() {
        let occurrence = Occurrence::new();
        let cid = occurrence.cid;
        let mut sample = Sample::new().with_occurrence(occurrence);

        assert!(sample.occurrence(cid).is_some());
        assert!(sample.remove_occurrence(cid).is_some());
        assert!(sample.occurrences.is_empty());
        assert!(sample.remove_occurrence(cid).is_none());
    }

    #[test]
    fn test_record_shape() {
        let sample = Sample::new()
            .with_attribute("date", "2024-05-01")
            .with_occurrence(Occurrence::new().with_attribute("taxon", 42));
        let record = Record::from_model(&sample).unwrap();

        assert_eq!(record.key(), Some(sample.cid.to_string()));
        assert!(record.get("occurrences").unwrap().is_array());
        assert_eq!(record.to_model::<Sample>().unwrap(), sample);
    }

    #[test]
    fn test_display() {
        let sample = Sample::new().with_attribute("date", "2024-05-01");
        let output = sample.to_string();
        assert!(output.contains("date: \"2024-05-01\""));
        assert!(output.contains("Synced: never"));
    }
}
