//! Bounded TTL response cache.
//!
//! [`TtlCache`] holds responses keyed on [`RequestKey`]. Each entry carries
//! its own TTL (taken from the endpoint policy at insertion time), and is
//! valid iff `now < stored_at + ttl`. Expired entries are never returned:
//! they are dropped on lookup, or in bulk by [`TtlCache::purge_expired()`].
//!
//! # Eviction
//!
//! Entries are kept in insertion order (`IndexMap`). When the store is full,
//! the least-recently-inserted entry is evicted before the new one is
//! admitted. Overwriting a key counts as a fresh insertion.
//!
//! # Concurrency
//!
//! A single mutex guards the map. Lookups are O(1) and no lock is held
//! across an await point, so contention is negligible at test-run volumes.
//!
//! State is process-local and does not survive a restart.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::types::RequestKey;

/// Default maximum number of cached entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn expires_at(&self) -> Instant {
        self.stored_at + self.ttl
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at()
    }
}

/// Diagnostic view of a cached key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedKey {
    pub key: RequestKey,
    pub remaining_ttl: Duration,
}

/// In-memory response cache with per-entry TTL and FIFO size bound.
pub struct TtlCache<V> {
    entries: Mutex<IndexMap<RequestKey, CacheEntry<V>>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    /// Create an empty cache holding at most `max_entries` (minimum 1).
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    /// Look up a fresh entry. Expired entries are removed and reported absent.
    pub fn get(&self, key: &RequestKey) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.shift_remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite an entry.
    ///
    /// A zero TTL is a no-op: such an entry could never be observed fresh.
    pub fn put(&self, key: RequestKey, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now(),
            ttl,
        };
        let mut entries = self.lock();
        entries.shift_remove(&key);
        while entries.len() >= self.max_entries {
            entries.shift_remove_index(0);
        }
        entries.insert(key, entry);
    }

    /// Remove a single entry.
    pub fn invalidate(&self, key: &RequestKey) {
        self.lock().shift_remove(key);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }

    /// Fresh keys with their remaining TTL, oldest insertion first.
    pub fn cached_keys(&self) -> Vec<CachedKey> {
        let now = self.clock.now();
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.is_fresh(now))
            .map(|(key, entry)| CachedKey {
                key: key.clone(),
                remaining_ttl: entry.expires_at() - now,
            })
            .collect()
    }

    /// Entries currently held, expired-but-unpurged ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<RequestKey, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    /// Periodically purge expired entries until the returned handle is
    /// aborted or the cache is dropped.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()>
    where
        Self: Send + Sync,
    {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "swept expired cache entries");
                }
            }
        })
    }
}
