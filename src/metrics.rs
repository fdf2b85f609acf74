//! Service Metrics
//!
//! Counters owned by an explicit prometheus [`Registry`]. Nothing is
//! registered globally, so tests can build as many instances as they need.

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};

/// Content type of [`ServiceMetrics::encode`] output
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Counters exported on `/metrics`.
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    issued_orders: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics")
            .field("issued_orders", &self.issued_orders.get())
            .field("cache_hits", &self.cache_hits.get())
            .field("cache_misses", &self.cache_misses.get())
            .finish()
    }
}

impl ServiceMetrics {
    /// Create the counters and register them with a fresh registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let issued_orders = register(
            &registry,
            "issued_orders_total",
            "Total number of orders issued to clients",
        )?;
        let cache_hits = register(
            &registry,
            "cache_hits_total",
            "Total number of cache-aside reads served from the cache",
        )?;
        let cache_misses = register(
            &registry,
            "cache_misses_total",
            "Total number of cache-aside reads that fell through to the store",
        )?;

        Ok(Self {
            registry,
            issued_orders,
            cache_hits,
            cache_misses,
        })
    }

    pub fn record_issued(&self, count: u64) {
        self.issued_orders.inc_by(count);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.inc();
    }

    pub fn issued_orders(&self) -> u64 {
        self.issued_orders.get()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.get()
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.get()
    }

    /// Render every registered metric in the text exposition format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

fn register(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .map_err(|e| Error::Internal(format!("Invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register metric {}: {}", name, e)))?;
    Ok(counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = ServiceMetrics::new().unwrap();
        assert_eq!(metrics.issued_orders(), 0);
        assert_eq!(metrics.cache_hits(), 0);
        assert_eq!(metrics.cache_misses(), 0);
    }

    #[test]
    fn test_instances_are_independent() {
        let a = ServiceMetrics::new().unwrap();
        let b = ServiceMetrics::new().unwrap();

        a.record_issued(3);
        a.record_cache_hit();

        assert_eq!(a.issued_orders(), 3);
        assert_eq!(b.issued_orders(), 0);
        assert_eq!(b.cache_hits(), 0);
    }

    #[test]
    fn test_encode_text_format() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.record_issued(2);
        metrics.record_cache_miss();

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("issued_orders_total 2"));
        assert!(text.contains("cache_misses_total 1"));
        assert!(text.contains("cache_hits_total 0"));
        assert!(CONTENT_TYPE.starts_with("text/plain"));
    }
}
