//! Keyed value store with expiry.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use sluice_core::BoxError;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors raised by an [`ObjectStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store refused the value because it is full.
    #[error("object store is full ({0} entries)")]
    Full(usize),

    /// The backing storage failed.
    #[error(transparent)]
    Backend(BoxError),
}

/// A keyed store of values, the external state behind redelivery counters and
/// OAuth contexts.
#[async_trait]
pub trait ObjectStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Whether a live value exists for `key`.
    async fn contains(&self, key: &str) -> Result<bool, StoreError>;

    /// The value stored for `key`.
    async fn retrieve(&self, key: &str) -> Result<Option<V>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn store(&self, key: &str, value: V) -> Result<(), StoreError>;

    /// Removes and returns the value for `key`.
    async fn remove(&self, key: &str) -> Result<Option<V>, StoreError>;
}

/// Configuration of an [`InMemoryObjectStore`].
#[derive(Debug, Clone, Deserialize, bon::Builder)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// How long an entry lives after it was last stored. `None` keeps entries
    /// until removed.
    pub entry_ttl: Option<Duration>,
    /// Upper bound on the number of entries. The oldest entry is evicted when
    /// a new key would exceed it.
    pub max_entries: Option<usize>,
    /// Interval of the background expiration sweep.
    #[builder(default = Duration::from_secs(60))]
    pub expiration_interval: Duration,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            entry_ttl: None,
            max_entries: None,
            expiration_interval: Duration::from_secs(60),
        }
    }
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// In-memory [`ObjectStore`] backed by a `DashMap`.
///
/// Expired entries are invisible to reads and removed by [`expire`], which
/// can run periodically through [`spawn_expiration_sweep`].
///
/// [`expire`]: InMemoryObjectStore::expire
/// [`spawn_expiration_sweep`]: InMemoryObjectStore::spawn_expiration_sweep
pub struct InMemoryObjectStore<V> {
    entries: DashMap<String, Entry<V>>,
    config: ObjectStoreConfig,
}

impl<V> InMemoryObjectStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty store.
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// The store configuration.
    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    /// Number of entries, including expired ones not swept yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes expired entries and returns how many were removed.
    pub fn expire(&self) -> usize {
        let Some(ttl) = self.config.entry_ttl else {
            return 0;
        };
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "expired object store entries");
        }
        removed
    }

    /// Runs [`expire`](Self::expire) every `expiration_interval` until the
    /// store is dropped.
    pub fn spawn_expiration_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.expiration_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.expire();
                    }
                    None => break,
                }
            }
        })
    }

    fn is_live(&self, entry: &Entry<V>) -> bool {
        self.config
            .entry_ttl
            .is_none_or(|ttl| entry.stored_at.elapsed() < ttl)
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

impl<V> Default for InMemoryObjectStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(ObjectStoreConfig::default())
    }
}

impl<V> fmt::Debug for InMemoryObjectStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl<V> ObjectStore<V> for InMemoryObjectStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .get(key)
            .is_some_and(|entry| self.is_live(&entry)))
    }

    async fn retrieve(&self, key: &str) -> Result<Option<V>, StoreError> {
        let value = match self.entries.get(key) {
            Some(entry) if self.is_live(&entry) => return Ok(Some(entry.value.clone())),
            Some(_) => None,
            None => return Ok(None),
        };
        self.entries
            .remove_if(key, |_, entry| !self.is_live(entry));
        Ok(value)
    }

    async fn store(&self, key: &str, value: V) -> Result<(), StoreError> {
        if let Some(max) = self.config.max_entries {
            if max == 0 {
                return Err(StoreError::Full(0));
            }
            if !self.entries.contains_key(key) && self.entries.len() >= max {
                self.expire();
                if self.entries.len() >= max {
                    self.evict_oldest();
                }
            }
        }
        self.entries.insert(
            key.to_owned(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<V>, StoreError> {
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, entry)| self.is_live(entry))
            .map(|(_, entry)| entry.value))
    }
}
