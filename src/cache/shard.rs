//! Cache Shard
//!
//! One independently locked partition of the key space.
//!
//! # Design
//!
//! - Each shard has its own RwLock; reads share it, writes are exclusive
//! - Expired entries are evicted eagerly by the read that finds them
//! - Counters are relaxed atomics outside the lock

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;

use super::entry::CacheEntry;

/// Single shard containing a key → entry map and statistics
pub struct Shard {
    /// The map for this shard
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Reads that returned a live entry
    hits: AtomicU64,
    /// Reads that found nothing or an expired entry
    misses: AtomicU64,
    /// Entries removed by a read because they had expired
    expired_evictions: AtomicU64,
    /// Entries removed by the background sweep
    swept: AtomicU64,
}

impl Default for Shard {
    fn default() -> Self {
        Self::new()
    }
}

impl Shard {
    /// Create a new empty shard
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_evictions: AtomicU64::new(0),
            swept: AtomicU64::new(0),
        }
    }

    /// Get the number of entries in this shard, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get hit count
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get count of entries evicted on read after expiry
    pub fn expired_eviction_count(&self) -> u64 {
        self.expired_evictions.load(Ordering::Relaxed)
    }

    /// Get count of entries removed by sweeps
    pub fn swept_count(&self) -> u64 {
        self.swept.load(Ordering::Relaxed)
    }

    /// Get a live payload.
    ///
    /// An entry found expired at `now` is removed under the exclusive lock
    /// and reported as absent.
    pub fn get(&self, key: &str, now: Instant) -> Option<Bytes> {
        {
            let guard = self.entries.read();
            match guard.get(key) {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.payload().clone());
                }
                Some(_) => {}
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.entries.write();
        // A concurrent set may have refreshed the key between the two locks
        if guard.get(key).is_some_and(|entry| entry.is_expired(now)) {
            guard.remove(key);
            self.expired_evictions.fetch_add(1, Ordering::Relaxed);
        }

        None
    }

    /// Insert an entry, replacing any previous entry for the key
    pub fn insert(&self, key: String, entry: CacheEntry) {
        let mut guard = self.entries.write();
        guard.insert(key, entry);
    }

    /// Remove an entry, returning true if one was present
    pub fn remove(&self, key: &str) -> bool {
        let mut guard = self.entries.write();
        guard.remove(key).is_some()
    }

    /// Clear all entries
    pub fn clear(&self) {
        let mut guard = self.entries.write();
        guard.clear();
    }

    /// Remove every entry that expired more than `threshold` before `now`.
    ///
    /// Returns the number of removed entries.
    pub fn sweep(&self, now: Instant, threshold: Duration) -> usize {
        let mut guard = self.entries.write();
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_stale(now, threshold));
        let removed = before - guard.len();

        if removed > 0 {
            self.swept.fetch_add(removed as u64, Ordering::Relaxed);
        }

        removed
    }
}

// =============================================================================
// Tests
// =============================================================================
