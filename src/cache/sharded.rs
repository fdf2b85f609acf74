//! Sharded Cache
//!
//! Routes keys across [`SHARD_COUNT`] shards with xxh32 and runs the
//! periodic stale-entry sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use xxhash_rust::xxh32::xxh32;

use super::entry::{CacheEntry, CacheKey};
use super::shard::Shard;
use super::{CacheConfig, CacheError, SHARD_COUNT};
use crate::domain::ports::CacheStore;

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries held by each shard, expired ones included
    pub entries_per_shard: Vec<usize>,
    /// Reads that returned a payload
    pub hits: u64,
    /// Reads that returned NotFound
    pub misses: u64,
    /// Entries evicted by reads after expiry
    pub expired_evictions: u64,
    /// Entries reclaimed by the sweep
    pub swept: u64,
}

impl CacheStats {
    /// Total number of entries across all shards
    pub fn total_entries(&self) -> usize {
        self.entries_per_shard.iter().sum()
    }
}

/// Concurrent key → bytes store with per-entry TTL
pub struct ShardedCache {
    shards: [Shard; SHARD_COUNT],
    config: CacheConfig,
}

impl Default for ShardedCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ShardedCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            shards: std::array::from_fn(|_| Shard::new()),
            config,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Shard index for a key
    #[inline]
    pub fn shard_index(key: &str) -> usize {
        xxh32(key.as_bytes(), 0) as usize % SHARD_COUNT
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        &self.shards[Self::shard_index(key)]
    }

    /// Get a live payload, or [`CacheError::NotFound`] on miss or expiry
    pub fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Result<Bytes, CacheError> {
        self.shard(key).get(key, now).ok_or(CacheError::NotFound)
    }

    /// Store a payload for `ttl`, replacing any previous entry
    pub fn set(&self, key: &str, value: impl Into<Bytes>, ttl: Duration) -> Result<(), CacheError> {
        self.set_at(key, value.into(), ttl, Instant::now())
    }

    pub(crate) fn set_at(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        now: Instant,
    ) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey);
        }

        self.shard(key)
            .insert(key.to_string(), CacheEntry::new(value, now, ttl));
        Ok(())
    }

    /// Remove a key; absent keys are not an error
    pub fn del(&self, key: &str) -> Result<(), CacheError> {
        self.shard(key).remove(key);
        Ok(())
    }

    /// Drop every entry. Idempotent.
    pub fn close(&self) -> Result<(), CacheError> {
        for shard in &self.shards {
            shard.clear();
        }
        debug!("Cache cleared");
        Ok(())
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Shard::is_empty)
    }

    /// Collect statistics
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            entries_per_shard: Vec::with_capacity(SHARD_COUNT),
            ..Default::default()
        };

        for shard in &self.shards {
            stats.entries_per_shard.push(shard.len());
            stats.hits += shard.hit_count();
            stats.misses += shard.miss_count();
            stats.expired_evictions += shard.expired_eviction_count();
            stats.swept += shard.swept_count();
        }

        stats
    }

    /// Run one sweep pass, one shard lock at a time.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_stale(&self, now: Instant) -> usize {
        let threshold = self.config.stale_threshold();
        self.shards
            .iter()
            .map(|shard| shard.sweep(now, threshold))
            .sum()
    }

    /// Start the background sweep loop on the current runtime
    pub fn spawn_sweeper(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.run_sweeper(token).await })
    }

    /// Sweep on every interval tick until `token` is cancelled
    #[instrument(skip(self, token))]
    pub async fn run_sweeper(&self, token: CancellationToken) {
        info!(
            "Starting cache sweeper: interval={:?}, stale_threshold={}h",
            self.config.sweep_interval, self.config.stale_threshold_hours
        );

        let mut tick = interval(self.config.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        tick.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Cache sweeper shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let removed = self.sweep_stale(Instant::now());
                    if removed > 0 {
                        debug!("Swept {} stale cache entries", removed);
                    }
                }
            }
        }
    }
}

impl CacheStore for ShardedCache {
    fn load(&self, key: &CacheKey) -> Result<Bytes, CacheError> {
        self.get(&key.render())
    }

    fn store(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.set(&key.render(), value, ttl)
    }

    fn evict(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.del(&key.render())
    }
}

// =============================================================================
// Tests
// =============================================================================
