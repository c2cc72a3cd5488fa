//! Morel Core Library
//!
//! Local storage and server synchronization for survey records.
//!
//! - [`Storage`]: an in-memory [`Collection`] kept consistent with a
//!   [`Backend`] across asynchronous initialization
//! - [`Manager`]: named storages for [`Sample`]s and [`Occurrence`]s, synced
//!   with a remote server through a [`Remote`]

pub mod backend;
pub mod collection;
pub mod error;
pub mod events;
pub mod manager;
pub mod models;
pub mod record;
pub mod storage;
pub mod sync;

pub use backend::{Backend, BackendConfig, MemoryBackend, SqliteBackend};
pub use collection::Collection;
pub use error::{StorageError, StorageResult};
pub use events::EventBus;
pub use manager::{
    Manager, ManagerError, ManagerOptions, Removal, SyncFailure, SyncReport, SYNC_DONE_EVENT,
};
pub use models::{Metadata, Model, Occurrence, Sample};
pub use record::{Identify, Record};
pub use storage::{Lifecycle, Storage, INIT_EVENT};
pub use sync::{Credentials, HttpRemote, Remote, SyncError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
