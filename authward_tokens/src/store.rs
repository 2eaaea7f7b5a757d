//! Pluggable key/value persistence for tokens and responses
//!
//! Both the token cache and the response cache are layered over a single
//! [`CredentialStore`]. The store is reached through a [`SharedStore`], which
//! allows the backing implementation to be replaced at runtime without
//! disturbing requests already in flight.

use std::{
    collections::HashMap,
    error, fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use arc_swap::ArcSwap;
use async_trait::async_trait;

/// An error reported by a credential store
pub type StoreError = Box<dyn error::Error + Send + Sync + 'static>;

/// An asynchronous key/value store with per-entry time-to-live
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieves the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key` for `ttl`
    async fn set(&self, key: &str, value: String, ttl: DurationSecs) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: DurationSecs) -> Result<(), StoreError> {
        (**self).set(key, value, ttl).await
    }
}

/// A store that never holds anything
///
/// Every lookup misses and every write succeeds. This is the store used until
/// a real one is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStore;

#[async_trait]
impl CredentialStore for NoopStore {
    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _: &str, _: String, _: DurationSecs) -> Result<(), StoreError> {
        Ok(())
    }
}

type Entries = HashMap<String, (String, UnixTime)>;

/// A process-local store that honors entry lifetimes
pub struct InMemoryStore<C = System> {
    entries: Mutex<Entries>,
    clock: C,
}

impl InMemoryStore<System> {
    /// Constructs a new, empty store using the system clock
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: System,
        }
    }
}

impl Default for InMemoryStore<System> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InMemoryStore<C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> InMemoryStore<D> {
        InMemoryStore {
            entries: self.entries,
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::from("in-memory store lock poisoned"))
    }
}

impl<C> fmt::Debug for InMemoryStore<C>
where
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let len = self.entries.lock().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("InMemoryStore")
            .field("entries", &len)
            .field("clock", &self.clock)
            .finish()
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> CredentialStore for InMemoryStore<C> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((value, expiry)) if now < *expiry => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: DurationSecs) -> Result<(), StoreError> {
        let expiry = UnixTime(self.clock.now().0.saturating_add(ttl.0));
        self.lock()?.insert(key.to_owned(), (value, expiry));
        Ok(())
    }
}

/// A replaceable handle to the credential store in use
///
/// Clones share the same slot, so replacing the store through any clone is
/// observed by every cache built on top of it. Lookups already holding the
/// previous store finish against it; no entries are migrated.
#[derive(Clone)]
pub struct SharedStore {
    current: Arc<ArcSwap<Box<dyn CredentialStore>>>,
}

impl SharedStore {
    /// Constructs a handle over `store`
    pub fn new(store: impl CredentialStore + 'static) -> Self {
        let store: Box<dyn CredentialStore> = Box::new(store);
        Self {
            current: Arc::new(ArcSwap::from_pointee(store)),
        }
    }

    /// Replaces the backing store for all future lookups
    pub fn replace(&self, store: impl CredentialStore + 'static) {
        let store: Box<dyn CredentialStore> = Box::new(store);
        self.current.store(Arc::new(store));
        tracing::debug!("credential store replaced");
    }

    /// Reads `key`, treating any store failure as a miss
    pub async fn get(&self, key: &str) -> Option<String> {
        let store = self.current.load_full();
        match store.get(key).await {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(
                    cache.key = key,
                    error = (&*error as &dyn error::Error),
                    "unable to read from credential store, treating as a miss"
                );
                None
            }
        }
    }

    /// Writes `key`, logging and discarding any store failure
    pub async fn set(&self, key: &str, value: String, ttl: DurationSecs) {
        let store = self.current.load_full();
        if let Err(error) = store.set(key, value, ttl).await {
            tracing::warn!(
                cache.key = key,
                ttl = ttl.0,
                error = (&*error as &dyn error::Error),
                "unable to write to credential store"
            );
        }
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new(NoopStore)
    }
}

impl fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SharedStore").finish_non_exhaustive()
    }
}
