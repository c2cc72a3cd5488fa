//! Survey models stored by the manager.
//!
//! Each model serializes to a [`Record`](crate::record::Record) and lives in
//! the storage named by [`Model::COLLECTION`].

mod metadata;
mod occurrence;
mod sample;

pub use metadata::Metadata;
pub use occurrence::Occurrence;
pub use sample::Sample;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::record::Identify;

/// A record type with its own named storage.
pub trait Model: Serialize + DeserializeOwned + Identify + Send + Sync {
    /// Name of the storage holding this model.
    const COLLECTION: &'static str;

    fn metadata(&self) -> &Metadata;

    /// True if never synced or modified since the last sync.
    fn is_pending(&self) -> bool {
        self.metadata().is_pending()
    }
}
