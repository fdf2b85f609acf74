//! Pickup Point Service Integration Tests
//!
//! End-to-end behavior against the in-memory datastore:
//! - Batch order issuance (single client, expiry, surcharge, atomicity)
//! - Order creation against the box weight rule under both policies
//! - Cache-aside reads of boxes and pickup points
//! - Unit of work commit / rollback semantics
//! - Audit records

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{DateTime, Utc};

use pickup_point_service::adapters::{InMemoryAuditCollector, InMemoryDatastore};
use pickup_point_service::cache::{CacheConfig, CacheKey, ShardedCache};
use pickup_point_service::domain::{
    Datastore, NewOrder, NewPickupPoint, NewShipmentBox, OpContext, Order, Page, Repositories,
    ShipmentBox,
};
use pickup_point_service::metrics::ServiceMetrics;
use pickup_point_service::usecase::{ServiceSettings, Services, WeightCheckPolicy};
use pickup_point_service::{Error, ErrorKind};

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    services: Services<InMemoryDatastore>,
    store: Arc<InMemoryDatastore>,
    cache: Arc<ShardedCache>,
    audit: Arc<InMemoryAuditCollector>,
    metrics: ServiceMetrics,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(ServiceSettings::default())
    }

    fn with_policy(policy: WeightCheckPolicy) -> Self {
        Self::with_settings(ServiceSettings {
            weight_check_policy: policy,
            ..Default::default()
        })
    }

    fn with_settings(settings: ServiceSettings) -> Self {
        let store = Arc::new(InMemoryDatastore::new());
        let cache = Arc::new(ShardedCache::new(CacheConfig::default()));
        let audit = Arc::new(InMemoryAuditCollector::new());
        let metrics = ServiceMetrics::new().unwrap();

        let services = Services::new(
            Arc::clone(&store),
            cache.clone(),
            audit.clone(),
            metrics.clone(),
            settings,
        );

        Self {
            services,
            store,
            cache,
            audit,
            metrics,
        }
    }

    async fn seed_box(&self, id: i64, is_check: bool, weight: f64, cost: f64) -> i64 {
        self.store
            .seed_box(shipment_box(id, is_check, weight, cost))
            .await
            .unwrap()
    }

    async fn seed_order(&self, order_id: i64, client_id: i64, box_id: i64, weight: f64) {
        self.seed_order_expiring(order_id, client_id, box_id, weight, Utc::now() + chrono::Duration::days(7))
            .await;
    }

    async fn seed_order_expiring(
        &self,
        order_id: i64,
        client_id: i64,
        box_id: i64,
        weight: f64,
        expires_at: DateTime<Utc>,
    ) {
        let now = Utc::now();
        self.store
            .seed_order(Order {
                order_id,
                client_id,
                box_id,
                weight,
                accepted_at: None,
                issued_at: None,
                returned_at: None,
                expires_at,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    async fn is_issued(&self, order_id: i64) -> bool {
        self.store.orders().get(order_id).await.unwrap().is_issued()
    }
}

fn shipment_box(id: i64, is_check: bool, weight: f64, cost: f64) -> ShipmentBox {
    let now = Utc::now();
    ShipmentBox {
        id,
        name: format!("box-{}", id),
        cost,
        is_check,
        weight,
        created_at: now,
        updated_at: now,
    }
}

fn new_order(order_id: i64, client_id: i64, box_id: i64, weight: f64) -> NewOrder {
    NewOrder {
        order_id,
        client_id,
        box_id,
        weight,
        expire_in_days: 7,
    }
}

// =============================================================================
// Batch Issuance
// =============================================================================

mod issue_tests {
    use super::*;

    #[tokio::test]
    async fn test_multiple_clients_issue_nothing() {
        let h = Harness::new();
        let box_id = h.seed_box(1, true, 5.0, 30.0).await;
        h.seed_order(101, 5, box_id, 3.0).await;
        h.seed_order(102, 7, box_id, 3.0).await;

        let result = h
            .services
            .orders
            .issue_orders(&OpContext::new(), vec![101, 102])
            .await;

        assert_matches!(
            result,
            Err(Error::MultipleClients {
                order_id: 102,
                client_id: 5
            })
        );
        assert!(!h.is_issued(101).await);
        assert!(!h.is_issued(102).await);
        assert_eq!(h.store.rollback_count(), 1);
        assert_eq!(h.metrics.issued_orders(), 0);
    }

    #[tokio::test]
    async fn test_expired_order_is_not_issued() {
        let h = Harness::new();
        let box_id = h.seed_box(1, false, 5.0, 0.0).await;
        let yesterday = Utc::now() - chrono::Duration::days(1);
        h.seed_order_expiring(101, 5, box_id, 3.0, yesterday).await;

        let result = h
            .services
            .orders
            .issue_orders(&OpContext::new(), vec![101])
            .await;

        assert_matches!(result, Err(Error::OrderExpired { order_id: 101, .. }));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::FailedPrecondition);
        assert!(!h.is_issued(101).await);
    }

    #[tokio::test]
    async fn test_expired_order_aborts_whole_batch() {
        let h = Harness::new();
        let box_id = h.seed_box(1, false, 5.0, 0.0).await;
        h.seed_order(101, 5, box_id, 3.0).await;
        h.seed_order_expiring(102, 5, box_id, 3.0, Utc::now() - chrono::Duration::hours(1))
            .await;

        let result = h
            .services
            .orders
            .issue_orders(&OpContext::new(), vec![101, 102])
            .await;

        assert_matches!(result, Err(Error::OrderExpired { order_id: 102, .. }));
        // 101 was marked inside the transaction, then rolled back
        assert!(!h.is_issued(101).await);
    }

    #[tokio::test]
    async fn test_surcharge_accumulates_for_overweight_checked_boxes() {
        let h = Harness::new();
        let checked = h.seed_box(1, true, 5.0, 30.0).await;
        let unchecked = h.seed_box(2, false, 5.0, 50.0).await;

        h.seed_order(101, 5, checked, 7.0).await; // over capacity: +30
        h.seed_order(102, 5, checked, 4.0).await; // within capacity
        h.seed_order(103, 5, checked, 9.5).await; // over capacity: +30
        h.seed_order(104, 5, unchecked, 20.0).await; // unchecked box

        let surcharge = h
            .services
            .orders
            .issue_orders(&OpContext::new(), vec![101, 102, 103, 104])
            .await
            .unwrap();

        assert_eq!(surcharge, 60.0);
        for order_id in 101..=104 {
            assert!(h.is_issued(order_id).await);
        }
        assert_eq!(h.metrics.issued_orders(), 4);
        assert_eq!(h.store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_order_aborts_batch() {
        let h = Harness::new();
        let box_id = h.seed_box(1, false, 5.0, 0.0).await;
        h.seed_order(101, 5, box_id, 3.0).await;

        let result = h
            .services
            .orders
            .issue_orders(&OpContext::new(), vec![101, 999])
            .await;

        assert_matches!(result, Err(Error::OrderNotFound(999)));
        assert!(!h.is_issued(101).await);
    }

    #[tokio::test]
    async fn test_commit_failure_surfaces_and_discards_issuance() {
        let h = Harness::new();
        let box_id = h.seed_box(1, false, 5.0, 0.0).await;
        h.seed_order(101, 5, box_id, 3.0).await;
        h.store.fail_next_commit();

        let result = h
            .services
            .orders
            .issue_orders(&OpContext::new(), vec![101])
            .await;

        assert_matches!(result, Err(Error::Transaction { stage: "commit", .. }));
        assert!(!h.is_issued(101).await);
        assert_eq!(h.metrics.issued_orders(), 0);
    }

    #[tokio::test]
    async fn test_rollback_failure_does_not_mask_cause() {
        let h = Harness::new();
        let box_id = h.seed_box(1, false, 5.0, 0.0).await;
        h.seed_order(101, 5, box_id, 3.0).await;
        h.seed_order(102, 7, box_id, 3.0).await;
        h.store.fail_next_rollback();

        let result = h
            .services
            .orders
            .issue_orders(&OpContext::new(), vec![101, 102])
            .await;

        assert_matches!(result, Err(Error::MultipleClients { .. }));
        assert!(!h.is_issued(101).await);
    }
}

// =============================================================================
// Order Creation
// =============================================================================

mod create_order_tests {
    use super::*;

    #[tokio::test]
    async fn test_overweight_order_rejected_without_insert() {
        for policy in [WeightCheckPolicy::Strict, WeightCheckPolicy::CachedFastPath] {
            let h = Harness::with_policy(policy);
            let box_id = h.seed_box(1, true, 5.0, 30.0).await;

            let result = h
                .services
                .orders
                .create_order(&OpContext::new(), new_order(101, 5, box_id, 7.0))
                .await;

            assert_matches!(
                result,
                Err(Error::BoxCapacityExceeded {
                    box_id: 1,
                    capacity,
                    ..
                }) if capacity == 5.0
            );
            assert_matches!(h.store.orders().get(101).await, Err(Error::OrderNotFound(101)));
            assert_eq!(h.store.commit_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_overweight_order_rejected_from_cache() {
        let h = Harness::new();
        let box_id = h.seed_box(1, true, 5.0, 30.0).await;
        h.services.boxes.get_box(&OpContext::new(), box_id).await.unwrap();

        let result = h
            .services
            .orders
            .create_order(&OpContext::new(), new_order(101, 5, box_id, 7.0))
            .await;

        assert_matches!(result, Err(Error::BoxCapacityExceeded { .. }));
        // Rejected before any transaction was opened
        assert_eq!(h.store.commit_count() + h.store.rollback_count(), 0);
        assert_matches!(h.store.orders().get(101).await, Err(Error::OrderNotFound(101)));
    }

    #[tokio::test]
    async fn test_strict_policy_revalidates_stale_cached_box() {
        let h = Harness::with_policy(WeightCheckPolicy::Strict);
        let box_id = h.seed_box(1, true, 5.0, 30.0).await;

        // Cached copy from before the capacity was tightened to 5.0
        let stale = serde_json::to_vec(&shipment_box(box_id, true, 10.0, 30.0)).unwrap();
        h.cache
            .set(&CacheKey::shipment_box(box_id).render(), stale, Duration::from_secs(3600))
            .unwrap();

        let result = h
            .services
            .orders
            .create_order(&OpContext::new(), new_order(101, 5, box_id, 7.0))
            .await;

        assert_matches!(result, Err(Error::BoxCapacityExceeded { .. }));
        assert_matches!(h.store.orders().get(101).await, Err(Error::OrderNotFound(101)));
        assert_eq!(h.store.rollback_count(), 1);
    }

    #[tokio::test]
    async fn test_cached_fast_path_trusts_cached_box_until_ttl() {
        let h = Harness::with_policy(WeightCheckPolicy::CachedFastPath);
        let box_id = h.seed_box(1, true, 5.0, 30.0).await;

        let stale = serde_json::to_vec(&shipment_box(box_id, true, 10.0, 30.0)).unwrap();
        h.cache
            .set(&CacheKey::shipment_box(box_id).render(), stale, Duration::from_secs(3600))
            .unwrap();

        // Accepted on the stale cached capacity without a transaction
        h.services
            .orders
            .create_order(&OpContext::new(), new_order(101, 5, box_id, 7.0))
            .await
            .unwrap();
        assert!(h.store.orders().get(101).await.is_ok());
        assert_eq!(h.store.commit_count(), 0);

        // Once the entry is gone the authoritative row applies again
        h.cache.del(&CacheKey::shipment_box(box_id).render()).unwrap();
        let result = h
            .services
            .orders
            .create_order(&OpContext::new(), new_order(102, 5, box_id, 7.0))
            .await;
        assert_matches!(result, Err(Error::BoxCapacityExceeded { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_order_id() {
        let h = Harness::new();
        let box_id = h.seed_box(1, false, 5.0, 0.0).await;
        let ctx = OpContext::new();

        h.services
            .orders
            .create_order(&ctx, new_order(101, 5, box_id, 1.0))
            .await
            .unwrap();
        let result = h
            .services
            .orders
            .create_order(&ctx, new_order(101, 6, box_id, 1.0))
            .await;

        assert_matches!(result, Err(Error::OrderAlreadyExists(101)));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::AlreadyExists);
        assert_eq!(h.store.orders().get(101).await.unwrap().client_id, 5);
    }

    #[tokio::test]
    async fn test_cancelled_context_writes_nothing() {
        let h = Harness::new();
        let box_id = h.seed_box(1, false, 5.0, 0.0).await;
        let ctx = OpContext::new();
        ctx.cancel();

        let result = h
            .services
            .orders
            .create_order(&ctx, new_order(101, 5, box_id, 1.0))
            .await;

        assert_matches!(result, Err(Error::Cancelled(_)));
        assert_matches!(h.store.orders().get(101).await, Err(Error::OrderNotFound(101)));
    }
}

// =============================================================================
// Cache-Aside Reads
// =============================================================================

mod cache_aside_tests {
    use super::*;

    #[tokio::test]
    async fn test_box_read_populates_cache() {
        let h = Harness::new();
        let box_id = h.seed_box(3, true, 5.0, 30.0).await;
        let key = CacheKey::shipment_box(box_id).render();
        assert!(h.cache.get(&key).is_err());

        let fetched = h.services.boxes.get_box(&OpContext::new(), box_id).await.unwrap();
        assert_eq!(fetched.id, box_id);

        let cached: ShipmentBox = serde_json::from_slice(&h.cache.get(&key).unwrap()).unwrap();
        assert_eq!(cached, fetched);
        assert_eq!(h.metrics.cache_misses(), 1);
    }

    #[tokio::test]
    async fn test_cached_box_survives_store_delete() {
        let h = Harness::new();
        let box_id = h.seed_box(3, true, 5.0, 30.0).await;
        let ctx = OpContext::new();
        h.services.boxes.get_box(&ctx, box_id).await.unwrap();

        h.store.boxes().delete(box_id).await.unwrap();

        // Served from the cache until the TTL runs out
        assert!(h.services.boxes.get_box(&ctx, box_id).await.is_ok());
        assert_eq!(h.metrics.cache_hits(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_falls_back_to_store() {
        let h = Harness::with_settings(ServiceSettings {
            box_ttl: Duration::from_millis(20),
            ..Default::default()
        });
        let box_id = h.seed_box(3, true, 5.0, 30.0).await;
        let ctx = OpContext::new();
        h.services.boxes.get_box(&ctx, box_id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        h.services.boxes.get_box(&ctx, box_id).await.unwrap();

        assert_eq!(h.metrics.cache_misses(), 2);
        assert_eq!(h.metrics.cache_hits(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_treated_as_miss() {
        let h = Harness::new();
        let ctx = OpContext::new();
        let id = h
            .services
            .pickup_points
            .create_pickup_point(
                &ctx,
                NewPickupPoint {
                    name: "Central".to_string(),
                    address: "1 Main St".to_string(),
                    contact: "+7 900 000 00 00".to_string(),
                },
            )
            .await
            .unwrap();

        let key = CacheKey::pickup_point(id).render();
        h.cache.set(&key, "{broken", Duration::from_secs(60)).unwrap();

        let point = h.services.pickup_points.get_pickup_point(&ctx, id).await.unwrap();
        assert_eq!(point.name, "Central");
        assert_eq!(h.metrics.cache_misses(), 1);
    }

    #[tokio::test]
    async fn test_closed_cache_falls_back_to_store() {
        let h = Harness::new();
        let box_id = h.seed_box(3, false, 5.0, 0.0).await;
        let ctx = OpContext::new();
        h.services.boxes.get_box(&ctx, box_id).await.unwrap();

        h.cache.close().unwrap();

        assert!(h.services.boxes.get_box(&ctx, box_id).await.is_ok());
        assert_eq!(h.metrics.cache_misses(), 2);
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

mod transaction_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_transaction_leaves_no_writes() {
        let h = Harness::new();
        let ctx = OpContext::new();

        let result = h
            .store
            .with_transaction(&ctx, |tx| {
                Box::pin(async move {
                    let box_id = tx
                        .boxes()
                        .create(&NewShipmentBox {
                            name: "temp".to_string(),
                            cost: 1.0,
                            is_check: false,
                            weight: 1.0,
                        })
                        .await?;
                    tx.orders().create(&new_order(1, 5, box_id, 1.0)).await?;
                    Err::<(), _>(Error::Internal("abort".to_string()))
                })
            })
            .await;

        assert_matches!(result, Err(Error::Internal(_)));
        assert_eq!(h.store.boxes().count().await.unwrap(), 0);
        assert_matches!(h.store.orders().get(1).await, Err(Error::OrderNotFound(1)));
    }

    #[tokio::test]
    async fn test_committed_transaction_applies_all_writes() {
        let h = Harness::new();
        let ctx = OpContext::new();

        let box_id = h
            .store
            .with_transaction(&ctx, |tx| {
                Box::pin(async move {
                    let box_id = tx
                        .boxes()
                        .create(&NewShipmentBox {
                            name: "kept".to_string(),
                            cost: 1.0,
                            is_check: false,
                            weight: 1.0,
                        })
                        .await?;
                    tx.orders().create(&new_order(1, 5, box_id, 1.0)).await?;
                    Ok::<_, Error>(box_id)
                })
            })
            .await
            .unwrap();

        assert_eq!(h.store.boxes().get(box_id).await.unwrap().name, "kept");
        assert_eq!(h.store.orders().get(1).await.unwrap().box_id, box_id);
    }

    #[tokio::test]
    async fn test_operation_timeout_is_enforced() {
        let h = Harness::with_settings(ServiceSettings {
            transaction_timeout: Some(Duration::ZERO),
            ..Default::default()
        });
        let box_id = h.seed_box(1, false, 5.0, 0.0).await;

        let result = h
            .services
            .orders
            .create_order(&OpContext::new(), new_order(101, 5, box_id, 1.0))
            .await;

        assert_matches!(result, Err(Error::DeadlineExceeded { .. }));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
        assert_matches!(h.store.orders().get(101).await, Err(Error::OrderNotFound(101)));
    }

    #[tokio::test]
    async fn test_expired_caller_deadline() {
        let h = Harness::new();
        let ctx = OpContext::new().with_timeout(Duration::ZERO);

        let result = h.services.orders.list_orders(&ctx, Page::default()).await;
        assert_matches!(result, Err(Error::DeadlineExceeded { .. }));
    }
}

// =============================================================================
// Audit
// =============================================================================

mod audit_tests {
    use super::*;
    use pickup_point_service::domain::AuditMethod;

    #[tokio::test]
    async fn test_every_operation_is_audited() {
        let h = Harness::new();
        let ctx = OpContext::new();
        let box_id = h
            .services
            .boxes
            .create_box(
                &ctx,
                NewShipmentBox {
                    name: "medium".to_string(),
                    cost: 10.0,
                    is_check: true,
                    weight: 10.0,
                },
            )
            .await
            .unwrap();
        h.services
            .orders
            .create_order(&ctx, new_order(101, 5, box_id, 2.0))
            .await
            .unwrap();
        h.services.orders.issue_orders(&ctx, vec![101]).await.unwrap();
        let _ = h.services.orders.issue_orders(&ctx, vec![101]).await;

        assert_eq!(h.audit.records_of(AuditMethod::CreateBox).len(), 1);
        assert_eq!(h.audit.records_of(AuditMethod::CreateOrder).len(), 1);

        // Failed calls are audited too
        let issued = h.audit.records_of(AuditMethod::IssueOrders);
        assert_eq!(issued.len(), 2);
        assert_eq!(issued[0].request, serde_json::json!([101]));

        let order = &h.audit.records_of(AuditMethod::CreateOrder)[0];
        assert_eq!(order.request["orderId"], 101);
        assert_eq!(order.request["weight"], 2.0);
    }
}
