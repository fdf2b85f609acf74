//! Use Cases
//!
//! Business operations over the datastore, the sharded cache and the audit
//! sink. Reads of boxes and pickup points go through the cache first; every
//! invariant-sensitive write is validated against rows read inside its own
//! transaction.
//!
//! # Usage
//!
//! ```ignore
//! let services = Services::new(store, cache, audit, metrics, ServiceSettings::default());
//! let surcharge = services.orders.issue_orders(&ctx, vec![101, 102]).await?;
//! ```

mod box_service;
mod cache_aside;
mod order_service;
mod pickup_point_service;

pub use box_service::BoxService;
pub use order_service::OrderService;
pub use pickup_point_service::PickupPointService;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::cache::{DEFAULT_BOX_TTL, DEFAULT_PICKUP_POINT_TTL};
use crate::domain::{AuditMethod, AuditPublisher, AuditRecord, CacheStore, Datastore, OpContext};
use crate::error::{Error, Result};
use crate::metrics::ServiceMetrics;

// =============================================================================
// Settings
// =============================================================================

/// How `create_order` trusts a cached box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightCheckPolicy {
    /// The cached box is only a pre-check; the insert always runs in a
    /// transaction that re-reads the box row.
    #[default]
    Strict,
    /// A cached box that accepts the weight allows a direct insert. A box
    /// changed after it was cached can be trusted for up to the box TTL.
    CachedFastPath,
}

impl WeightCheckPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightCheckPolicy::Strict => "strict",
            WeightCheckPolicy::CachedFastPath => "cached-fast-path",
        }
    }
}

impl std::fmt::Display for WeightCheckPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightCheckPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(WeightCheckPolicy::Strict),
            "cached-fast-path" => Ok(WeightCheckPolicy::CachedFastPath),
            other => Err(Error::Config(format!(
                "unknown weight check policy '{}', expected 'strict' or 'cached-fast-path'",
                other
            ))),
        }
    }
}

/// Settings shared by all services
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// TTL of cached boxes
    pub box_ttl: Duration,

    /// TTL of cached pickup points
    pub pickup_point_ttl: Duration,

    pub weight_check_policy: WeightCheckPolicy,

    /// Upper bound on each operation; `None` leaves the caller's deadline as is
    pub transaction_timeout: Option<Duration>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            box_ttl: DEFAULT_BOX_TTL,
            pickup_point_ttl: DEFAULT_PICKUP_POINT_TTL,
            weight_check_policy: WeightCheckPolicy::Strict,
            transaction_timeout: None,
        }
    }
}

// =============================================================================
// Shared Dependencies
// =============================================================================

/// Collaborators every service works with.
pub(crate) struct ServiceDeps<D: Datastore> {
    pub store: Arc<D>,
    pub cache: Arc<dyn CacheStore>,
    pub audit: Arc<dyn AuditPublisher>,
    pub metrics: ServiceMetrics,
    pub settings: ServiceSettings,
}

impl<D: Datastore> ServiceDeps<D> {
    /// Apply the configured operation timeout to the caller's context.
    pub fn scoped(&self, ctx: &OpContext) -> OpContext {
        match self.settings.transaction_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        }
    }

    /// Publish an audit record for one call. Failures are logged and dropped.
    pub async fn audit<R>(&self, method: AuditMethod, request: &R)
    where
        R: Serialize + Sync + ?Sized,
    {
        let record = match AuditRecord::new(method, request) {
            Ok(record) => record,
            Err(e) => {
                warn!(method = %method, error = %e, "Failed to build audit record");
                return;
            }
        };

        if let Err(e) = self.audit.publish(record).await {
            warn!(method = %method, error = %e, "Failed to publish audit record");
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// All services over one datastore.
pub struct Services<D: Datastore> {
    pub boxes: BoxService<D>,
    pub orders: OrderService<D>,
    pub pickup_points: PickupPointService<D>,
}

impl<D: Datastore> Services<D> {
    pub fn new(
        store: Arc<D>,
        cache: Arc<dyn CacheStore>,
        audit: Arc<dyn AuditPublisher>,
        metrics: ServiceMetrics,
        settings: ServiceSettings,
    ) -> Self {
        let deps = Arc::new(ServiceDeps {
            store,
            cache,
            audit,
            metrics,
            settings,
        });

        Self {
            boxes: BoxService::new(Arc::clone(&deps)),
            orders: OrderService::new(Arc::clone(&deps)),
            pickup_points: PickupPointService::new(deps),
        }
    }
}
