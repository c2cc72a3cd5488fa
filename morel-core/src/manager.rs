//! Manager: named storages plus synchronization with the remote server.
//!
//! Models are routed to the storage named by [`Model::COLLECTION`]. Records
//! carry their own sync state under `metadata`; there is no separate sync
//! table.
//!
//! Removing a record the server already has is a two-step affair: the
//! record is marked `deleted` and hidden from reads, the deletion is sent,
//! and only then is it purged. A deletion that cannot reach the server stays
//! marked and is retried by [`Manager::sync_all`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::backend::BackendConfig;
use crate::error::StorageError;
use crate::events::EventBus;
use crate::models::{Model, Occurrence, Sample};
use crate::record::{Identify, Record};
use crate::storage::{Storage, INIT_EVENT};
use crate::sync::protocol::{self, Deletion, Submission};
use crate::sync::{Credentials, HttpRemote, Remote, SyncError};

/// Event triggered after every [`Manager::sync_all`] run.
pub const SYNC_DONE_EVENT: &str = "sync:done";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerOptions {
    /// Remote endpoint receiving submissions and deletions.
    pub url: String,
    pub appname: String,
    pub appsecret: String,
    pub website_id: i64,
    pub survey_id: i64,
    #[serde(default)]
    pub storage: BackendConfig,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ManagerOptions {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            appname: self.appname.clone(),
            appsecret: self.appsecret.clone(),
            website_id: self.website_id,
            survey_id: self.survey_id,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.url.trim().is_empty() {
            return Err(ManagerError::Config("url is required".to_string()));
        }
        if self.appname.trim().is_empty() {
            return Err(ManagerError::Config("appname is required".to_string()));
        }
        Ok(())
    }
}

/// Errors returned by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Outcome of [`Manager::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Gone locally and, if it was synced, on the server.
    Removed,
    /// Hidden locally; the server deletion will be retried by `sync_all`.
    Pending,
}

/// A record that could not be synchronized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub collection: String,
    pub key: String,
    pub error: SyncError,
}

/// Summary of a [`Manager::sync_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records sent to the server, deletions included.
    pub attempted: usize,
    pub synced: usize,
    pub deleted: usize,
    /// Records the server refused; the run went on without them.
    pub failures: Vec<SyncFailure>,
    /// Failure that stopped the run, if any.
    pub aborted: Option<SyncError>,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.failures.len() + usize::from(self.aborted.is_some())
    }

    /// True if every pending record made it to the server.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }
}

/// Coordinates the sample and occurrence storages with a remote server.
pub struct Manager {
    options: ManagerOptions,
    stores: Vec<Storage>,
    remote: Arc<dyn Remote>,
    events: Arc<EventBus>,
    state: Arc<watch::Sender<bool>>,
}

impl Manager {
    /// Creates a manager talking HTTP to `options.url`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(options: ManagerOptions) -> Result<Self, ManagerError> {
        options.validate()?;
        let remote = HttpRemote::new(options.url.clone(), options.credentials(), options.timeout())?;
        Ok(Self::with_remote(options, Arc::new(remote)))
    }

    /// Creates a manager over any [`Remote`].
    pub fn with_remote(options: ManagerOptions, remote: Arc<dyn Remote>) -> Self {
        let stores: Vec<Storage> = [Sample::COLLECTION, Occurrence::COLLECTION]
            .into_iter()
            .map(|name| Storage::open(name, options.storage.clone()))
            .collect();
        let events = Arc::new(EventBus::new());
        let (state, _) = watch::channel(false);

        let manager = Self {
            options,
            stores,
            remote,
            events,
            state: Arc::new(state),
        };
        manager.watch_init();
        manager
    }

    fn watch_init(&self) {
        let stores = self.stores.clone();
        let events = self.events.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            match try_join_all(stores.iter().map(Storage::ready)).await {
                Ok(_) => {
                    tracing::info!("Manager initialized {} storage(s)", stores.len());
                    state.send_replace(true);
                    events.trigger_once(INIT_EVENT);
                }
                Err(e) => tracing::warn!("Manager failed to initialize: {}", e),
            }
        });
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// The storage called `name`, if the manager owns one.
    pub fn storage(&self, name: &str) -> Option<&Storage> {
        self.stores.iter().find(|storage| storage.name() == name)
    }

    pub fn storages(&self) -> &[Storage] {
        &self.stores
    }

    /// True once every storage is ready.
    pub fn initialized(&self) -> bool {
        *self.state.borrow()
    }

    /// Registers an event callback. `init` fires once all storages are
    /// ready, and runs right away when registered after that; `sync:done`
    /// fires after each `sync_all`.
    pub fn on<F>(&self, name: &str, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on(name, callback);
    }

    /// Waits until every storage is ready.
    pub async fn ready(&self) -> Result<(), ManagerError> {
        try_join_all(self.stores.iter().map(Storage::ready)).await?;

        let mut rx = self.state.subscribe();
        rx.wait_for(|initialized| *initialized)
            .await
            .map_err(|_| StorageError::Uninitialized("manager".to_string()))?;
        Ok(())
    }

    fn store<M: Model>(&self) -> Result<&Storage, ManagerError> {
        self.storage(M::COLLECTION)
            .ok_or_else(|| ManagerError::Config(format!("no storage named '{}'", M::COLLECTION)))
    }

    /// Stores a model locally.
    pub async fn set<M: Model>(&self, model: &M) -> Result<M, ManagerError> {
        let stored = self.store::<M>()?.set(Record::from_model(model)?).await?;
        Ok(stored.to_model()?)
    }

    /// Fetches a model; records awaiting remote deletion are `NotFound`.
    pub async fn get<M: Model>(&self, target: &(impl Identify + ?Sized)) -> Result<M, ManagerError> {
        let record = self.store::<M>()?.get(target).await?;
        if protocol::is_marked_deleted(&record) {
            return Err(StorageError::not_found(target.identifier()?).into());
        }
        Ok(record.to_model()?)
    }

    /// Like [`Manager::get`] but a missing record is `None`.
    pub async fn find<M: Model>(
        &self,
        target: &(impl Identify + ?Sized),
    ) -> Result<Option<M>, ManagerError> {
        match self.get::<M>(target).await {
            Ok(model) => Ok(Some(model)),
            Err(ManagerError::Storage(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn has<M: Model>(&self, target: &(impl Identify + ?Sized)) -> Result<bool, ManagerError> {
        Ok(self.find::<M>(target).await?.is_some())
    }

    /// True if this model is stored.
    pub async fn contains<M: Model>(&self, model: &M) -> Result<bool, ManagerError> {
        self.has::<M>(model).await
    }

    /// All visible models in insertion order.
    pub async fn get_all<M: Model>(&self) -> Result<Vec<M>, ManagerError> {
        self.store::<M>()?
            .get_all()
            .await?
            .iter()
            .filter(|record| !protocol::is_marked_deleted(record))
            .map(|record| record.to_model().map_err(ManagerError::from))
            .collect()
    }

    pub async fn size<M: Model>(&self) -> Result<usize, ManagerError> {
        let records = self.store::<M>()?.get_all().await?;
        Ok(records
            .iter()
            .filter(|record| !protocol::is_marked_deleted(record))
            .count())
    }

    /// Empties every storage. Nothing is sent to the server.
    pub async fn clear(&self) -> Result<(), ManagerError> {
        try_join_all(self.stores.iter().map(Storage::clear)).await?;
        Ok(())
    }

    /// Removes a model, deleting it on the server first if it was synced.
    pub async fn remove<M: Model>(
        &self,
        target: &(impl Identify + ?Sized),
    ) -> Result<Removal, ManagerError> {
        let storage = self.store::<M>()?;
        let record = storage.get(target).await?;
        if protocol::is_marked_deleted(&record) {
            return Err(StorageError::not_found(target.identifier()?).into());
        }

        if Deletion::from_record(storage.name(), &record).is_none() {
            storage.remove(&record).await?;
            return Ok(Removal::Removed);
        }

        let mut marked = record;
        protocol::mark_deleted(&mut marked);
        let marked = storage.set(marked).await?;

        match self.purge(storage, &marked).await {
            Ok(()) => Ok(Removal::Removed),
            Err(e) if e.is_transient() => {
                tracing::warn!("Deletion of '{}' deferred: {}", marked.key().unwrap_or_default(), e);
                Ok(Removal::Pending)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sends one model to the server and stores the acknowledged version.
    ///
    /// On failure the stored copy is left as it was. Local edits made while
    /// the request was in flight are kept and stay pending.
    pub async fn sync<M: Model>(&self, model: &M) -> Result<M, ManagerError> {
        let storage = self.store::<M>()?;
        let synced = self.sync_record(storage, Record::from_model(model)?).await?;
        Ok(synced.to_model()?)
    }

    /// Synchronizes every pending record and every pending deletion.
    ///
    /// A record the server rejects is reported and skipped; a transport or
    /// server failure stops the run.
    pub async fn sync_all(&self) -> Result<SyncReport, ManagerError> {
        let mut report = SyncReport::default();

        'stores: for storage in &self.stores {
            for record in storage.get_all().await? {
                let deleting = protocol::is_marked_deleted(&record);
                if !deleting && !protocol::is_pending(&record) {
                    continue;
                }

                report.attempted += 1;
                let result = if deleting {
                    self.purge(storage, &record).await
                } else {
                    self.sync_record(storage, record.clone()).await.map(|_| ())
                };

                match result {
                    Ok(()) if deleting => report.deleted += 1,
                    Ok(()) => report.synced += 1,
                    Err(error) if error.is_transient() => {
                        tracing::warn!("Sync aborted: {}", error);
                        report.aborted = Some(error);
                        break 'stores;
                    }
                    Err(error) => {
                        let key = record.key().unwrap_or_default();
                        tracing::warn!("Failed to sync '{}' in '{}': {}", key, storage.name(), error);
                        report.failures.push(SyncFailure {
                            collection: storage.name().to_string(),
                            key,
                            error,
                        });
                    }
                }
            }
        }

        tracing::info!(
            "Sync finished: {} synced, {} deleted, {} failed",
            report.synced,
            report.deleted,
            report.failed()
        );
        self.events.trigger(SYNC_DONE_EVENT);

        Ok(report)
    }

    async fn sync_record(&self, storage: &Storage, record: Record) -> Result<Record, SyncError> {
        let submission = Submission::from_record(storage.name(), &record)?;
        let started = Utc::now();
        let synced_on = protocol::last_updated(&record).map_or(started, |updated| updated.max(started));
        let receipt = self.remote.submit(&submission).await?;

        // The stored copy wins if it was edited after the snapshot was taken.
        let snapshot = record.clone();
        let stored = storage
            .update(record, move |current| {
                if protocol::last_updated(current) <= protocol::last_updated(&snapshot) {
                    *current = snapshot;
                }
                protocol::apply_receipt(current, &receipt, synced_on);
            })
            .await?;

        tracing::debug!("Synced '{}' as {}", submission.cid, stored.id().unwrap_or_default());
        Ok(stored)
    }

    async fn purge(&self, storage: &Storage, record: &Record) -> Result<(), SyncError> {
        if let Some(deletion) = Deletion::from_record(storage.name(), record) {
            self.remote.delete(&deletion).await?;
        }
        storage.remove(record).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("url", &self.options.url)
            .field("stores", &self.stores)
            .field("initialized", &self.initialized())
            .finish()
    }
}
