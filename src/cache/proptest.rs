//! Property-Based Tests for the Sharded Cache
//!
//! # Test Properties
//!
//! 1. **Read-your-write**: set(k, v, d > 0) then get(k) = v
//! 2. **Expiry**: get(k) at or after set + d is NotFound
//! 3. **Key validation**: set("", v, d) is InvalidKey for all v, d
//! 4. **Close**: nothing set before close is readable after it
//! 5. **Sweep bound**: an unread entry is gone once ttl + threshold has passed

#![cfg(test)]

use std::time::{Duration, Instant};

use bytes::Bytes;
use proptest::prelude::*;

use super::{CacheConfig, CacheError, CacheKey, ShardedCache, SHARD_COUNT};

// =============================================================================
// Property Strategies
// =============================================================================

/// Non-empty keys, including ones that look like rendered cache keys
fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,12}:[0-9]{1,9}",
        ".{1,40}".prop_filter("non-empty", |s| !s.is_empty()),
    ]
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// TTLs from one second to one day
fn ttl_strategy() -> impl Strategy<Value = Duration> {
    (1u64..=86_400).prop_map(Duration::from_secs)
}

// =============================================================================
// Get/Set Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_set_then_get_returns_value(
        key in key_strategy(),
        payload in payload_strategy(),
        ttl in ttl_strategy(),
    ) {
        let cache = ShardedCache::default();
        let now = Instant::now();
        cache.set_at(&key, Bytes::from(payload.clone()), ttl, now).unwrap();

        prop_assert_eq!(cache.get_at(&key, now).unwrap(), Bytes::from(payload));
    }

    #[test]
    fn prop_get_at_or_after_ttl_is_not_found(
        key in key_strategy(),
        payload in payload_strategy(),
        ttl in ttl_strategy(),
        extra_secs in 0u64..10_000,
    ) {
        let cache = ShardedCache::default();
        let now = Instant::now();
        cache.set_at(&key, Bytes::from(payload), ttl, now).unwrap();

        let later = now + ttl + Duration::from_secs(extra_secs);
        prop_assert_eq!(cache.get_at(&key, later), Err(CacheError::NotFound));
        prop_assert!(cache.is_empty());
    }

    #[test]
    fn prop_empty_key_is_invalid(
        payload in payload_strategy(),
        ttl_secs in 0u64..1_000_000,
    ) {
        let cache = ShardedCache::default();
        let result = cache.set("", Bytes::from(payload), Duration::from_secs(ttl_secs));

        prop_assert_eq!(result, Err(CacheError::InvalidKey));
        prop_assert!(cache.is_empty());
    }

    #[test]
    fn prop_close_hides_all_keys(
        keys in prop::collection::vec(key_strategy(), 1..50),
    ) {
        let cache = ShardedCache::default();
        for key in &keys {
            cache.set(key, Bytes::from_static(b"v"), Duration::from_secs(3600)).unwrap();
        }

        cache.close().unwrap();

        for key in &keys {
            prop_assert_eq!(cache.get(key), Err(CacheError::NotFound));
        }
    }
}

// =============================================================================
// Sweep and Routing Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_sweep_removes_unread_entry_after_threshold(
        key in key_strategy(),
        ttl in ttl_strategy(),
        threshold_hours in 0u32..48,
    ) {
        let cache = ShardedCache::new(CacheConfig {
            stale_threshold_hours: threshold_hours as f64,
            ..Default::default()
        });
        let now = Instant::now();
        cache.set_at(&key, Bytes::from_static(b"v"), ttl, now).unwrap();

        let threshold = Duration::from_secs(threshold_hours as u64 * 3600);

        // Still retained at exactly ttl + threshold
        prop_assert_eq!(cache.sweep_stale(now + ttl + threshold), 0);
        prop_assert_eq!(cache.len(), 1);

        prop_assert_eq!(cache.sweep_stale(now + ttl + threshold + Duration::from_secs(1)), 1);
        prop_assert!(cache.is_empty());
    }

    #[test]
    fn prop_rendered_keys_route_deterministically(
        object_type in "[a-z]{1,10}",
        object_id in any::<i64>(),
    ) {
        let key = CacheKey::new(object_type.clone(), object_id);
        let rendered = key.render();

        prop_assert_eq!(&rendered, &format!("{}:{}", object_type, object_id));
        let index = ShardedCache::shard_index(&rendered);
        prop_assert!(index < SHARD_COUNT);
        prop_assert_eq!(index, ShardedCache::shard_index(&key.to_string()));
    }
}
