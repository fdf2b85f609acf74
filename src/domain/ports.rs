//! Domain Ports (Port/Adapter Pattern)
//!
//! Capability traits the use cases depend on. Adapters implement them over
//! PostgreSQL, an in-process store, the sharded cache and the audit sink.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  BoxRepository │ OrderRepository │ PickupPointRepo  │    │
//! │  │  Repositories  │ Datastore │ CacheStore │ Audit     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  PgDatastore │ InMemoryDatastore │ ShardedCache     │    │
//! │  │  LoggingAuditPublisher │ InMemoryAuditCollector     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Unit of Work
//!
//! [`Datastore::with_transaction`] hands the closure a transaction-scoped
//! [`Repositories`] borrowed for the lifetime of the transaction only. The
//! closure returns a boxed future over that borrow, so nothing bound to the
//! transaction can escape it:
//!
//! ```ignore
//! let total = store
//!     .with_transaction(&ctx, move |tx| {
//!         Box::pin(async move {
//!             let order = tx.orders().get(order_id).await?;
//!             order.ensure_issuable(Utc::now())?;
//!             tx.orders().mark_issued(order_id, order.client_id).await?;
//!             tx.orders().box_info(order_id).await.map(|info| info.surcharge())
//!         })
//!     })
//!     .await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

use super::context::OpContext;
use super::events::AuditRecord;
use super::models::{
    NewOrder, NewPickupPoint, NewShipmentBox, Order, OrderBoxInfo, Page, PickupPoint,
    PickupPointUpdate, ReturnedOrder, ShipmentBox,
};
use crate::cache::{CacheError, CacheKey};
use crate::error::Result;

// =============================================================================
// Repository Ports
// =============================================================================

/// Port for shipment box persistence.
#[async_trait]
pub trait BoxRepository: Send + Sync {
    /// Insert a box and return its ID.
    async fn create(&self, data: &NewShipmentBox) -> Result<i64>;

    /// Find a live box. `BoxNotFound` if absent or deleted.
    async fn get(&self, box_id: i64) -> Result<ShipmentBox>;

    /// Soft-delete a box. `BoxNotFound` if nothing was deleted.
    async fn delete(&self, box_id: i64) -> Result<()>;

    /// Count live boxes.
    async fn count(&self) -> Result<i64>;

    /// List live boxes, newest first.
    async fn list(&self, page: &Page) -> Result<Vec<ShipmentBox>>;
}

/// Port for order persistence.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a received order. `OrderAlreadyExists` on a duplicate ID.
    async fn create(&self, data: &NewOrder) -> Result<()>;

    /// Find an order in any state.
    async fn get(&self, order_id: i64) -> Result<Order>;

    /// Client of an order that is neither issued nor returned.
    async fn client_of(&self, order_id: i64) -> Result<i64>;

    /// Mark an open order of `client_id` as issued.
    ///
    /// Touching zero rows means the order is not an open order of that
    /// client and fails with `MultipleClients`.
    async fn mark_issued(&self, order_id: i64, client_id: i64) -> Result<()>;

    /// Box attributes joined to the order.
    async fn box_info(&self, order_id: i64) -> Result<OrderBoxInfo>;

    /// Record that the client accepted the order back. `OrderNotFound` on zero rows.
    async fn mark_accepted(&self, order_id: i64, client_id: i64) -> Result<()>;

    /// Return the order to the courier. `OrderNotFound` on zero rows.
    async fn mark_returned(&self, order_id: i64) -> Result<()>;

    /// Count orders that have not been returned.
    async fn count_open(&self) -> Result<i64>;

    /// List orders that have not been returned, newest first.
    async fn list_open(&self, page: &Page) -> Result<Vec<Order>>;

    async fn count_returned(&self) -> Result<i64>;

    async fn list_returned(&self, page: &Page) -> Result<Vec<ReturnedOrder>>;

    async fn count_unique_clients(&self) -> Result<i64>;

    /// Distinct client IDs in ascending order.
    async fn list_unique_clients(&self, page: &Page) -> Result<Vec<i64>>;
}

/// Port for pickup point persistence.
#[async_trait]
pub trait PickupPointRepository: Send + Sync {
    /// Insert a pickup point and return its ID.
    async fn create(&self, data: &NewPickupPoint) -> Result<i64>;

    /// Check whether a live point with the same name, address and contact exists.
    async fn exists(&self, data: &NewPickupPoint) -> Result<bool>;

    async fn get(&self, pickup_point_id: i64) -> Result<PickupPoint>;

    async fn list(&self, page: &Page) -> Result<Vec<PickupPoint>>;

    async fn count(&self) -> Result<i64>;

    /// Apply a partial update. `PickupPointNotFound` on zero rows.
    async fn update(&self, update: &PickupPointUpdate) -> Result<()>;

    /// Soft-delete. `PickupPointNotFound` on zero rows.
    async fn delete(&self, pickup_point_id: i64) -> Result<()>;
}

// =============================================================================
// Unit of Work Ports
// =============================================================================

/// Per-entity repository accessors.
///
/// Implemented by both the root datastore and its transaction-scoped
/// counterpart; callers cannot tell the two apart.
pub trait Repositories: Send + Sync {
    fn boxes(&self) -> &dyn BoxRepository;
    fn orders(&self) -> &dyn OrderRepository;
    fn pickup_points(&self) -> &dyn PickupPointRepository;
}

/// Root datastore that can open transactions.
#[async_trait]
pub trait Datastore: Repositories + 'static {
    /// Run `f` inside one transaction.
    ///
    /// - `f` fails: roll back and return `f`'s error. A rollback failure is
    ///   logged and never replaces it.
    /// - `f` succeeds: commit; a commit failure is returned as-is.
    /// - `ctx` cancelled or past its deadline: the in-flight call is dropped
    ///   and the transaction rolled back before returning.
    async fn with_transaction<T, F>(&self, ctx: &OpContext, f: F) -> Result<T>
    where
        T: Send,
        F: for<'r> FnOnce(&'r dyn Repositories) -> BoxFuture<'r, Result<T>> + Send;
}

// =============================================================================
// Cache Port
// =============================================================================

/// Port for the read-accelerating cache, keyed by structured keys.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &CacheKey) -> std::result::Result<Bytes, CacheError>;

    fn store(
        &self,
        key: &CacheKey,
        value: Bytes,
        ttl: Duration,
    ) -> std::result::Result<(), CacheError>;

    fn evict(&self, key: &CacheKey) -> std::result::Result<(), CacheError>;
}

// =============================================================================
// Audit Publisher Port
// =============================================================================

/// Port for publishing audit records.
#[async_trait]
pub trait AuditPublisher: Send + Sync {
    /// Publish one record.
    async fn publish(&self, record: AuditRecord) -> Result<()>;

    /// Publish multiple records.
    async fn publish_all(&self, records: Vec<AuditRecord>) -> Result<()> {
        for record in records {
            self.publish(record).await?;
        }
        Ok(())
    }
}
