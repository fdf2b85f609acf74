//! Cache-aside reads
//!
//! The cache never fails a read: an undecodable entry is a miss and a
//! failed repopulation is only logged.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheError, CacheKey};
use crate::domain::CacheStore;
use crate::error::Result;
use crate::metrics::ServiceMetrics;

/// Decode a cached value, if there is a usable one.
pub(crate) fn cached<T: DeserializeOwned>(cache: &dyn CacheStore, key: &CacheKey) -> Option<T> {
    let payload = match cache.load(key) {
        Ok(payload) => payload,
        Err(CacheError::NotFound) => return None,
        Err(e) => {
            warn!(key = %key, error = %e, "Cache lookup failed");
            return None;
        }
    };

    match serde_json::from_slice(&payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding undecodable cache entry");
            None
        }
    }
}

/// Best-effort write of `value` under `key`.
pub(crate) fn populate<T: Serialize>(cache: &dyn CacheStore, key: &CacheKey, value: &T, ttl: Duration) {
    let payload = match serde_json::to_vec(value) {
        Ok(payload) => Bytes::from(payload),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to encode value for cache");
            return;
        }
    };

    if let Err(e) = cache.store(key, payload, ttl) {
        warn!(key = %key, error = %e, "Failed to populate cache");
    }
}

/// Serve `key` from the cache, or await `load` and cache its result.
///
/// Load errors are returned unchanged and nothing is cached for them.
pub(crate) async fn read_through<T, Fut>(
    cache: &dyn CacheStore,
    metrics: &ServiceMetrics,
    key: &CacheKey,
    ttl: Duration,
    load: Fut,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    Fut: Future<Output = Result<T>>,
{
    if let Some(value) = cached(cache, key) {
        metrics.record_cache_hit();
        debug!(key = %key, "Cache hit");
        return Ok(value);
    }

    metrics.record_cache_miss();
    debug!(key = %key, "Cache miss");

    let value = load.await?;
    populate(cache, key, &value, ttl);
    Ok(value)
}
