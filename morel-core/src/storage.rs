//! Storage: a backend plus the in-memory collection that mirrors it.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> Initializing -> Ready
//!                              \-> Failed
//! ```
//!
//! [`Storage::open`] enters `Initializing` immediately and loads the backend
//! in a background task. Calls made before `Ready` wait in a FIFO queue and
//! run in arrival order once the cache is loaded. Mutations always go through
//! the same queue, so the cache matches the last acknowledged backend write.
//! Reads against a ready storage touch only the cache.

use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{watch, Mutex};

use crate::backend::{self, Backend, BackendConfig};
use crate::collection::Collection;
use crate::error::{StorageError, StorageResult};
use crate::events::EventBus;
use crate::record::{Identify, Record};

/// Event triggered once the cache has been loaded.
pub const INIT_EVENT: &str = "init";

/// Initialization state of a storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
    Failed(StorageError),
}

/// Handle to a named store. Cloning shares the same cache and backend.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    backend: OnceLock<Arc<dyn Backend>>,
    cache: RwLock<Collection>,
    state: watch::Sender<Lifecycle>,
    queue: Mutex<()>,
    events: EventBus,
}

impl Storage {
    /// Opens a storage over the configured backend.
    ///
    /// Must be called within a Tokio runtime.
    pub fn open(name: impl Into<String>, config: BackendConfig) -> Self {
        let storage = Self::uninitialized(name.into());
        let name = storage.inner.name.clone();
        storage.spawn_init(async move { backend::connect(&config, &name).await });
        storage
    }

    /// Opens a storage over an already-constructed backend.
    pub fn with_backend(name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        let storage = Self::uninitialized(name.into());
        storage.spawn_init(async move { Ok(backend) });
        storage
    }

    fn uninitialized(name: String) -> Self {
        let (state, _) = watch::channel(Lifecycle::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                name,
                backend: OnceLock::new(),
                cache: RwLock::new(Collection::new()),
                state,
                queue: Mutex::new(()),
                events: EventBus::new(),
            }),
        }
    }

    fn spawn_init<F>(&self, connect: F)
    where
        F: std::future::Future<Output = StorageResult<Arc<dyn Backend>>> + Send + 'static,
    {
        self.inner.state.send_replace(Lifecycle::Initializing);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            match Self::load(&inner, connect).await {
                Ok(count) => {
                    tracing::info!("Storage '{}' initialized with {} record(s)", inner.name, count);
                    inner.state.send_replace(Lifecycle::Ready);
                    inner.events.trigger_once(INIT_EVENT);
                }
                Err(e) => {
                    tracing::warn!("Storage '{}' failed to initialize: {}", inner.name, e);
                    inner.state.send_replace(Lifecycle::Failed(e));
                }
            }
        });
    }

    async fn load<F>(inner: &Inner, connect: F) -> StorageResult<usize>
    where
        F: std::future::Future<Output = StorageResult<Arc<dyn Backend>>>,
    {
        let backend = connect.await?;
        let collection = Collection::from_records(backend.get_all().await?)?;
        let count = collection.len();

        *inner.cache.write().unwrap_or_else(PoisonError::into_inner) = collection;
        // Set once, by this task only.
        let _ = inner.backend.set(backend);

        Ok(count)
    }

    /// Name of the store.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state.borrow().clone()
    }

    /// True once the cache reflects the backend.
    pub fn initialized(&self) -> bool {
        matches!(*self.inner.state.borrow(), Lifecycle::Ready)
    }

    /// Registers an event callback. `init` fires once, when ready; an `init`
    /// callback registered after that runs immediately.
    pub fn on<F>(&self, name: &str, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.on(name, callback);
    }

    /// Waits until initialization finishes.
    pub async fn ready(&self) -> StorageResult<()> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|state| matches!(state, Lifecycle::Ready | Lifecycle::Failed(_)))
            .await
            .map_err(|_| StorageError::Uninitialized(self.inner.name.clone()))?;

        match &*state {
            Lifecycle::Failed(e) => Err(StorageError::Uninitialized(e.to_string())),
            _ => Ok(()),
        }
    }

    /// Stores a record in the backend, then in the cache.
    pub async fn set(&self, record: Record) -> StorageResult<Record> {
        let key = record.require_key()?;

        let _turn = self.inner.queue.lock().await;
        let backend = self.ready_backend().await?;

        let stored = backend.set(&record).await?;
        self.cache_mut().insert(stored.clone())?;

        tracing::debug!("Stored '{}' in '{}'", key, self.inner.name);
        Ok(stored)
    }

    /// Applies `change` to the stored version of `record` and stores the
    /// result, all in one queue turn. A record that is not stored yet is
    /// changed as given.
    pub async fn update<F>(&self, record: Record, change: F) -> StorageResult<Record>
    where
        F: FnOnce(&mut Record) + Send,
    {
        let key = record.require_key()?;

        let _turn = self.inner.queue.lock().await;
        let backend = self.ready_backend().await?;

        let mut current = self.cache().get(&key).cloned().unwrap_or(record);
        change(&mut current);
        current.require_key()?;

        let stored = backend.set(&current).await?;
        self.cache_mut().insert(stored.clone())?;

        tracing::debug!("Updated '{}' in '{}'", key, self.inner.name);
        Ok(stored)
    }

    /// Returns the cached record.
    pub async fn get<I: Identify + ?Sized>(&self, target: &I) -> StorageResult<Record> {
        let identifier = target.identifier()?;
        self.await_turn_if_initializing().await?;

        self.cache()
            .get(&identifier)
            .cloned()
            .ok_or_else(|| StorageError::not_found(identifier))
    }

    /// True if the cache holds the record.
    pub async fn has<I: Identify + ?Sized>(&self, target: &I) -> StorageResult<bool> {
        let identifier = target.identifier()?;
        self.await_turn_if_initializing().await?;

        Ok(self.cache().contains(&identifier))
    }

    /// Removes the record from the backend, then from the cache.
    pub async fn remove<I: Identify + ?Sized>(&self, target: &I) -> StorageResult<()> {
        let identifier = target.identifier()?;

        let _turn = self.inner.queue.lock().await;
        let backend = self.ready_backend().await?;

        let key = self.cache().resolve(&identifier).unwrap_or(identifier);
        backend.remove(&key).await?;
        self.cache_mut()
            .remove(&key)
            .ok_or_else(|| StorageError::not_found(key.as_str()))?;

        tracing::debug!("Removed '{}' from '{}'", key, self.inner.name);
        Ok(())
    }

    /// All cached records in insertion order.
    pub async fn get_all(&self) -> StorageResult<Vec<Record>> {
        self.await_turn_if_initializing().await?;
        Ok(self.cache().to_vec())
    }

    /// Number of cached records.
    pub async fn size(&self) -> StorageResult<usize> {
        self.await_turn_if_initializing().await?;
        Ok(self.cache().len())
    }

    /// Empties the backend and the cache. Safe to call repeatedly.
    pub async fn clear(&self) -> StorageResult<()> {
        let _turn = self.inner.queue.lock().await;
        let backend = self.ready_backend().await?;

        backend.clear().await?;
        self.cache_mut().clear();

        tracing::debug!("Cleared '{}'", self.inner.name);
        Ok(())
    }

    /// Called with the queue held: waits for initialization and returns the
    /// backend.
    async fn ready_backend(&self) -> StorageResult<Arc<dyn Backend>> {
        self.ready().await?;
        self.inner
            .backend
            .get()
            .cloned()
            .ok_or_else(|| StorageError::Uninitialized(self.inner.name.clone()))
    }

    /// Reads issued before `Ready` queue behind earlier calls.
    async fn await_turn_if_initializing(&self) -> StorageResult<()> {
        match self.lifecycle() {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Failed(e) => Err(StorageError::Uninitialized(e.to_string())),
            Lifecycle::Uninitialized | Lifecycle::Initializing => {
                let _turn = self.inner.queue.lock().await;
                self.ready().await
            }
        }
    }

    fn cache(&self) -> RwLockReadGuard<'_, Collection> {
        self.inner.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_mut(&self) -> RwLockWriteGuard<'_, Collection> {
        self.inner.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("name", &self.inner.name)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}
