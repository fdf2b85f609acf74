//! Order operations
//!
//! Two paths carry cross-entity invariants:
//!
//! - `create_order` checks the order weight against its box. The cached box
//!   is consulted first; unless [`WeightCheckPolicy::CachedFastPath`] lets a
//!   cached acceptance stand, the box row is re-read and the order inserted
//!   in one transaction.
//! - `issue_orders` issues a batch atomically: every order must be open,
//!   unexpired and owned by one client, or nothing is issued.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::cache_aside;
use super::{ServiceDeps, WeightCheckPolicy};
use crate::cache::CacheKey;
use crate::domain::{
    AuditMethod, Datastore, NewOrder, OpContext, Order, Page, Paginated, ReturnedOrder,
    ShipmentBox,
};
use crate::error::{Error, Result};

pub struct OrderService<D: Datastore> {
    deps: Arc<ServiceDeps<D>>,
}

impl<D: Datastore> OrderService<D> {
    pub(crate) fn new(deps: Arc<ServiceDeps<D>>) -> Self {
        Self { deps }
    }

    /// Receive an order from a courier.
    ///
    /// Fails with `BoxCapacityExceeded` when the box checks weight and the
    /// order is heavier than its capacity; no order row is written then.
    #[instrument(
        skip(self, ctx, request),
        fields(order_id = request.order_id, box_id = request.box_id)
    )]
    pub async fn create_order(&self, ctx: &OpContext, request: NewOrder) -> Result<()> {
        self.deps.audit(AuditMethod::CreateOrder, &request).await;
        request.validate()?;

        let ctx = self.deps.scoped(ctx);
        let key = CacheKey::shipment_box(request.box_id);
        let cache = self.deps.cache.as_ref();

        match cache_aside::cached::<ShipmentBox>(cache, &key) {
            Some(cached_box) => {
                self.deps.metrics.record_cache_hit();
                // Box dimensions never change, so a cached rejection stands
                cached_box.ensure_accepts(request.weight)?;

                if self.deps.settings.weight_check_policy == WeightCheckPolicy::CachedFastPath {
                    ctx.run("create order", self.deps.store.orders().create(&request))
                        .await?;
                    info!("Order received on cached box check");
                    return Ok(());
                }
            }
            None => self.deps.metrics.record_cache_miss(),
        }

        let order = request.clone();
        let shipment_box = self
            .deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move {
                    let shipment_box = tx.boxes().get(order.box_id).await?;
                    shipment_box.ensure_accepts(order.weight)?;
                    tx.orders().create(&order).await?;
                    Ok::<_, Error>(shipment_box)
                })
            })
            .await?;

        cache_aside::populate(cache, &key, &shipment_box, self.deps.settings.box_ttl);

        info!("Order received");
        Ok(())
    }

    /// Issue a batch of orders to their client and return the aggregate
    /// surcharge for overweight orders in weight-checked boxes.
    ///
    /// Duplicate IDs are issued once. Any order that is missing, already
    /// issued or returned, expired, or owned by another client aborts the
    /// whole batch.
    #[instrument(skip(self, ctx, order_ids), fields(batch = order_ids.len()))]
    pub async fn issue_orders(&self, ctx: &OpContext, order_ids: Vec<i64>) -> Result<f64> {
        self.deps.audit(AuditMethod::IssueOrders, &order_ids).await;

        let mut seen = HashSet::new();
        let batch: Vec<i64> = order_ids
            .into_iter()
            .filter(|order_id| seen.insert(*order_id))
            .collect();
        if batch.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one order ID is required".to_string(),
            ));
        }
        let issued = batch.len() as u64;

        let ctx = self.deps.scoped(ctx);
        let now = Utc::now();
        let surcharge = self
            .deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move {
                    let mut owner: Option<i64> = None;
                    let mut surcharge = 0.0;

                    for order_id in batch {
                        let order = tx.orders().get(order_id).await?;
                        order.ensure_issuable(now)?;

                        let client_id = *owner.get_or_insert(order.client_id);
                        if order.client_id != client_id {
                            return Err(Error::MultipleClients {
                                order_id,
                                client_id,
                            });
                        }

                        tx.orders().mark_issued(order_id, client_id).await?;
                        surcharge += tx.orders().box_info(order_id).await?.surcharge();
                    }

                    Ok::<_, Error>(surcharge)
                })
            })
            .await?;

        self.deps.metrics.record_issued(issued);
        info!(issued, surcharge, "Orders issued");
        Ok(surcharge)
    }

    /// Record that a client accepted an order back.
    #[instrument(skip(self, ctx))]
    pub async fn accept_order(&self, ctx: &OpContext, order_id: i64, client_id: i64) -> Result<()> {
        self.deps
            .audit(
                AuditMethod::AcceptOrder,
                &json!({ "orderId": order_id, "clientId": client_id }),
            )
            .await;

        let ctx = self.deps.scoped(ctx);
        self.deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move { tx.orders().mark_accepted(order_id, client_id).await })
            })
            .await?;

        info!(order_id, client_id, "Order accepted");
        Ok(())
    }

    /// Return an order to the courier. Returned orders leave the open list.
    #[instrument(skip(self, ctx))]
    pub async fn return_order(&self, ctx: &OpContext, order_id: i64) -> Result<()> {
        self.deps.audit(AuditMethod::ReturnOrder, &order_id).await;

        let ctx = self.deps.scoped(ctx);
        self.deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move { tx.orders().mark_returned(order_id).await })
            })
            .await?;

        info!(order_id, "Order returned");
        Ok(())
    }

    /// Page through orders that have not been returned, newest first.
    #[instrument(skip(self, ctx))]
    pub async fn list_orders(&self, ctx: &OpContext, page: Page) -> Result<Paginated<Order>> {
        self.deps.audit(AuditMethod::ListOrders, &page).await;
        page.validate()?;

        let ctx = self.deps.scoped(ctx);
        let (total, items) = self
            .deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move {
                    let total = tx.orders().count_open().await?;
                    let items = tx.orders().list_open(&page).await?;
                    Ok::<_, Error>((total, items))
                })
            })
            .await?;

        debug!(total, returned = items.len(), "Listed orders");
        Ok(Paginated::new(items, page, total))
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_returned_orders(
        &self,
        ctx: &OpContext,
        page: Page,
    ) -> Result<Paginated<ReturnedOrder>> {
        self.deps.audit(AuditMethod::ListReturnedOrders, &page).await;
        page.validate()?;

        let ctx = self.deps.scoped(ctx);
        let (total, items) = self
            .deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move {
                    let total = tx.orders().count_returned().await?;
                    let items = tx.orders().list_returned(&page).await?;
                    Ok::<_, Error>((total, items))
                })
            })
            .await?;

        debug!(total, returned = items.len(), "Listed returned orders");
        Ok(Paginated::new(items, page, total))
    }

    /// Page through the distinct clients that have orders.
    #[instrument(skip(self, ctx))]
    pub async fn list_unique_clients(&self, ctx: &OpContext, page: Page) -> Result<Paginated<i64>> {
        self.deps.audit(AuditMethod::ListUniqueClients, &page).await;
        page.validate()?;

        let ctx = self.deps.scoped(ctx);
        let (total, items) = self
            .deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move {
                    let total = tx.orders().count_unique_clients().await?;
                    let items = tx.orders().list_unique_clients(&page).await?;
                    Ok::<_, Error>((total, items))
                })
            })
            .await?;

        Ok(Paginated::new(items, page, total))
    }
}
