//! Storage backend abstraction
//!
//! The cache layer never talks to a store directly; it goes through the
//! [`Backend`] trait. Implementations wrap whatever external key-value
//! service is in play (memcached, Redis, a remote HTTP cache). The crate
//! ships [`MemoryBackend`], an in-process implementation used by tests and
//! demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// External key-value store boundary
///
/// All values cross this boundary as strings; callers are responsible for
/// encoding. Expiry is advisory: backends that cannot honor a TTL may ignore
/// the `expires` argument.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value, optionally expiring after `expires`
    async fn set(&self, key: &str, value: String, expires: Option<Duration>) -> Result<()>;

    /// Delete a key (absent keys are not an error)
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a key currently holds a value
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Fetch many keys in one round trip
    ///
    /// The returned map has an entry for every requested key; keys the store
    /// does not hold map to `None`.
    async fn multi_get(&self, keys: &[String]) -> Result<HashMap<String, Option<String>>>;
}

/// Operation counters for [`MemoryBackend`]
#[derive(Debug, Clone, Default)]
pub struct MemoryBackendStats {
    /// Single-key reads
    pub gets: u64,
    /// Writes
    pub sets: u64,
    /// Deletes
    pub deletes: u64,
    /// Batched reads (round trips, not keys)
    pub multi_gets: u64,
}

/// Stored value with its optional expiry instant
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn new(value: String, expires: Option<Duration>) -> Self {
        let expires_at = expires.map(|ttl| {
            Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(3600))
        });
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }
}

/// In-memory backend for tests and demos
///
/// Honors per-entry expiry. Reads treat expired entries as absent; the
/// slots themselves linger until overwritten, deleted, or reclaimed with
/// [`MemoryBackend::purge_expired`].
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, StoredValue>>,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    multi_gets: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            multi_gets: AtomicU64::new(0),
        }
    }
}

impl MemoryBackend {
    /// Create an empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|v| !v.is_expired()).count()
    }

    /// Check whether the backend holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove expired entries, returning how many were dropped
    ///
    /// Reads already treat expired entries as absent; this reclaims the
    /// slots they occupy.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| !stored.is_expired());
        let purged = before - entries.len();
        if purged > 0 {
            debug!("Purged {} expired entries", purged);
        }
        purged
    }

    /// Snapshot of operation counters
    pub fn stats(&self) -> MemoryBackendStats {
        MemoryBackendStats {
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            multi_gets: self.multi_gets.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::Relaxed);

        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(stored) if !stored.is_expired() => Ok(Some(stored.value.clone())),
            Some(_) => {
                debug!("Entry expired: {}", key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, expires: Option<Duration>) -> Result<()> {
        self.sets.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoredValue::new(value, expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(matches!(entries.get(key), Some(stored) if !stored.is_expired()))
    }

    async fn multi_get(&self, keys: &[String]) -> Result<HashMap<String, Option<String>>> {
        self.multi_gets.fetch_add(1, Ordering::Relaxed);

        let entries = self.entries.read().await;
        let mut found = 0usize;
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            let value = match entries.get(key) {
                Some(stored) if !stored.is_expired() => {
                    found += 1;
                    Some(stored.value.clone())
                }
                _ => None,
            };
            out.insert(key.clone(), value);
        }

        debug!("Multi-get: {}/{} keys present", found, keys.len());
        Ok(out)
    }
}
