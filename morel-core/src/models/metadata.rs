use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync bookkeeping carried inside every record under `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    /// When the server last acknowledged this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_on: Option<DateTime<Utc>>,
    /// Server-side timestamp of the last acknowledged version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_on: Option<DateTime<Utc>>,
    /// Marked for remote deletion; hidden from reads until purged.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Metadata {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_on: now,
            updated_on: now,
            synced_on: None,
            server_on: None,
            deleted: false,
        }
    }

    /// Records a local modification.
    pub fn touch(&mut self) {
        self.updated_on = Utc::now();
    }

    pub fn is_synced(&self) -> bool {
        self.synced_on.is_some()
    }

    pub fn is_pending(&self) -> bool {
        match self.synced_on {
            Some(synced_on) => self.updated_on > synced_on,
            None => true,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}
