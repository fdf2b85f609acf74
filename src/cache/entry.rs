//! Cache Entry Types
//!
//! Keys are structured `(object type, object id)` pairs rendered into a flat
//! string before routing; entries carry their own absolute expiry.

use std::time::{Duration, Instant};

use bytes::Bytes;

/// Object type tag for shipment boxes
pub const BOX_OBJECT_TYPE: &str = "box";

/// Object type tag for pickup points
pub const PICKUP_POINT_OBJECT_TYPE: &str = "pvz";

/// Logical cache key - composite of object type and object ID
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    object_type: String,
    object_id: i64,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(object_type: impl Into<String>, object_id: i64) -> Self {
        Self {
            object_type: object_type.into(),
            object_id,
        }
    }

    /// Key for a shipment box
    pub fn shipment_box(box_id: i64) -> Self {
        Self::new(BOX_OBJECT_TYPE, box_id)
    }

    /// Key for a pickup point
    pub fn pickup_point(pickup_point_id: i64) -> Self {
        Self::new(PICKUP_POINT_OBJECT_TYPE, pickup_point_id)
    }

    /// Get the object type
    #[inline]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Get the object ID
    #[inline]
    pub fn object_id(&self) -> i64 {
        self.object_id
    }

    /// Render the flat `"{objectType}:{objectID}"` form used for hashing and lookup.
    pub fn render(&self) -> String {
        render_key(&self.object_type, self.object_id)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// Pure key construction shared by [`CacheKey::render`] and callers that only
/// hold the raw parts.
pub fn render_key(object_type: &str, object_id: i64) -> String {
    format!("{}:{}", object_type, object_id)
}

/// A cached payload with its absolute expiry.
///
/// Owned by exactly one shard and only ever touched under that shard's lock.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    payload: Bytes,
    expires_at: Instant,
}

impl CacheEntry {
    /// Create an entry that expires `ttl` after `now`
    pub fn new(payload: Bytes, now: Instant, ttl: Duration) -> Self {
        // Saturate instead of panicking on absurd TTLs
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| far_future(now));
        Self {
            payload,
            expires_at,
        }
    }

    /// Get the payload
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// An entry is expired from its expiry instant onwards.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// True once more than `threshold` has elapsed since expiry.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        now.checked_duration_since(self.expires_at)
            .map(|since_expiry| since_expiry > threshold)
            .unwrap_or(false)
    }
}

fn far_future(now: Instant) -> Instant {
    // ~30 years; well past any process lifetime
    now + Duration::from_secs(60 * 60 * 24 * 365 * 30)
}
