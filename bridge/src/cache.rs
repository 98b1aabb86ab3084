//! TTL result cache keyed by job key.
//!
//! Entries expire lazily: an expired entry is removed the first time a lookup
//! touches it. There is no background sweep. Time comes from
//! [`tokio::time::Instant`], so tests can drive expiry with a paused clock.

use std::{num::NonZeroUsize, time::Duration};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use crate::job::JobKey;

/// TTL class of a cached result, fixed per tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheClass {
    /// Slowly changing data: status, table lists, schemas, policies.
    Metadata,
    /// Query results.
    Query,
}

/// TTL per [`CacheClass`].
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub metadata: Duration,
    pub query: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            metadata: Duration::from_secs(300),
            query: Duration::from_secs(30),
        }
    }
}

impl CacheTtls {
    pub fn ttl(&self, class: CacheClass) -> Duration {
        match class {
            CacheClass::Metadata => self.metadata,
            CacheClass::Query => self.query,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    class: CacheClass,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Live entry as reported by [`ResultCache::snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct CachedKey {
    pub key: String,
    pub class: CacheClass,
    pub expires_in_secs: f64,
}

/// Thread-safe TTL cache. Unbounded unless a capacity is given, in which case
/// the least recently used entry is evicted first.
pub struct ResultCache {
    entries: Mutex<LruCache<JobKey, CacheEntry>>,
    ttls: CacheTtls,
}

impl ResultCache {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            ttls,
        }
    }

    pub fn with_capacity(ttls: CacheTtls, max_entries: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_entries)),
            ttls,
        }
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    /// Returns the cached value if it has not expired. An expired entry is
    /// removed and reported as absent.
    pub fn lookup(&self, key: &JobKey) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        entries.pop(key);
        None
    }

    /// Stores a value, overwriting any previous entry for the key. A TTL too
    /// large to represent is not cached.
    pub fn store(&self, key: JobKey, value: Value, class: CacheClass) {
        let Some(expires_at) = Instant::now().checked_add(self.ttls.ttl(class)) else {
            warn!(key = %key, ?class, "Cache TTL overflows the clock, not caching");
            return;
        };
        self.entries.lock().put(
            key,
            CacheEntry {
                value,
                class,
                expires_at,
            },
        );
    }

    pub fn remove(&self, key: &JobKey) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Removes every entry. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Live entries, sorted by key.
    pub fn snapshot(&self) -> Vec<CachedKey> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let mut live: Vec<CachedKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_fresh(now))
            .map(|(key, entry)| CachedKey {
                key: key.to_string(),
                class: entry.class,
                expires_in_secs: entry.expires_at.duration_since(now).as_secs_f64(),
            })
            .collect();
        live.sort_by(|a, b| a.key.cmp(&b.key));
        live
    }
}
