//! Sharded TTL Cache
//!
//! In-memory read accelerator for boxes and pickup points.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ShardedCache                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   key ──► xxh32(key) % 32 ──► Shard[i]                           │
//! │                                                                  │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐        ┌─────────┐          │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │  ....  │ Shard 31│          │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │        │ RwLock  │          │
//! │  └─────────┘ └─────────┘ └─────────┘        └─────────┘          │
//! │        ▲                                                         │
//! │        └──── Sweeper (interval tick, one shard lock at a time)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Expiry
//!
//! - Reads never return an entry at or past its expiry; they evict it
//! - The sweeper reclaims entries that expired long ago and were never read

mod entry;
mod shard;
mod sharded;

#[cfg(test)]
mod proptest;

pub use entry::{
    render_key, CacheEntry, CacheKey, BOX_OBJECT_TYPE, PICKUP_POINT_OBJECT_TYPE,
};
pub use shard::Shard;
pub use sharded::{CacheStats, ShardedCache};

use std::time::Duration;

use thiserror::Error;

/// Number of shards, fixed at construction
pub const SHARD_COUNT: usize = 32;

/// Default period between sweep passes (10 minutes)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default time past expiry after which the sweep reclaims an entry
pub const DEFAULT_STALE_THRESHOLD_HOURS: f64 = 1.0;

/// Default TTL for cached boxes (1 hour)
pub const DEFAULT_BOX_TTL: Duration = Duration::from_secs(60 * 60);

/// Default TTL for cached pickup points (24 hours)
pub const DEFAULT_PICKUP_POINT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache failures visible to callers
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// Missing, expired or cleared entry
    #[error("Cache entry not found")]
    NotFound,

    /// Empty cache key
    #[error("Invalid cache key")]
    InvalidKey,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Period between sweep passes
    pub sweep_interval: Duration,
    /// Hours an entry may stay expired before the sweep removes it
    pub stale_threshold_hours: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stale_threshold_hours: DEFAULT_STALE_THRESHOLD_HOURS,
        }
    }
}

impl CacheConfig {
    /// Reject configurations the sweeper cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(crate::Error::Config(
                "cache sweep interval must be positive".to_string(),
            ));
        }
        if !self.stale_threshold_hours.is_finite() || self.stale_threshold_hours < 0.0 {
            return Err(crate::Error::Config(format!(
                "cache stale threshold must be a non-negative number of hours, got {}",
                self.stale_threshold_hours
            )));
        }
        Ok(())
    }

    /// Stale threshold as a duration
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.stale_threshold_hours * 3600.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
