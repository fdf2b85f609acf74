//! Shipment box operations

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::cache_aside;
use super::ServiceDeps;
use crate::cache::CacheKey;
use crate::domain::{AuditMethod, Datastore, NewShipmentBox, OpContext, Page, Paginated, ShipmentBox};
use crate::error::{Error, Result};

/// Box catalogue: create, delete, list and cached lookups.
pub struct BoxService<D: Datastore> {
    deps: Arc<ServiceDeps<D>>,
}

impl<D: Datastore> BoxService<D> {
    pub(crate) fn new(deps: Arc<ServiceDeps<D>>) -> Self {
        Self { deps }
    }

    /// Register a new box type and return its ID.
    #[instrument(skip(self, ctx, request), fields(name = %request.name))]
    pub async fn create_box(&self, ctx: &OpContext, request: NewShipmentBox) -> Result<i64> {
        self.deps.audit(AuditMethod::CreateBox, &request).await;
        request.validate()?;

        let ctx = self.deps.scoped(ctx);
        let box_id = ctx
            .run("create box", self.deps.store.boxes().create(&request))
            .await?;

        info!(box_id, "Box created");
        Ok(box_id)
    }

    /// Soft-delete a box.
    ///
    /// A cached copy is left to expire with its TTL.
    #[instrument(skip(self, ctx))]
    pub async fn delete_box(&self, ctx: &OpContext, box_id: i64) -> Result<()> {
        self.deps.audit(AuditMethod::DeleteBox, &box_id).await;

        let ctx = self.deps.scoped(ctx);
        ctx.run("delete box", self.deps.store.boxes().delete(box_id))
            .await?;

        info!(box_id, "Box deleted");
        Ok(())
    }

    /// Page through live boxes, newest first.
    #[instrument(skip(self, ctx))]
    pub async fn list_boxes(&self, ctx: &OpContext, page: Page) -> Result<Paginated<ShipmentBox>> {
        self.deps.audit(AuditMethod::ListBoxes, &page).await;
        page.validate()?;

        let ctx = self.deps.scoped(ctx);
        let (total, items) = self
            .deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move {
                    let total = tx.boxes().count().await?;
                    let items = tx.boxes().list(&page).await?;
                    Ok::<_, Error>((total, items))
                })
            })
            .await?;

        debug!(total, returned = items.len(), "Listed boxes");
        Ok(Paginated::new(items, page, total))
    }

    /// Fetch a box, from the cache when possible.
    #[instrument(skip(self, ctx))]
    pub async fn get_box(&self, ctx: &OpContext, box_id: i64) -> Result<ShipmentBox> {
        self.deps.audit(AuditMethod::GetBox, &box_id).await;

        let ctx = self.deps.scoped(ctx);
        let key = CacheKey::shipment_box(box_id);
        cache_aside::read_through(
            self.deps.cache.as_ref(),
            &self.deps.metrics,
            &key,
            self.deps.settings.box_ttl,
            ctx.run("get box", self.deps.store.boxes().get(box_id)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecase::fixture::fixture;
    use crate::usecase::ServiceSettings;
    use assert_matches::assert_matches;

    fn small_box() -> NewShipmentBox {
        NewShipmentBox {
            name: "small".to_string(),
            cost: 20.0,
            is_check: true,
            weight: 5.0,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_box() {
        let fx = fixture(ServiceSettings::default());
        let ctx = OpContext::new();

        let box_id = fx.services.boxes.create_box(&ctx, small_box()).await.unwrap();
        let shipment_box = fx.services.boxes.get_box(&ctx, box_id).await.unwrap();

        assert_eq!(shipment_box.name, "small");
        assert_eq!(shipment_box.weight, 5.0);
        assert_eq!(fx.metrics.cache_misses(), 1);

        // Second read is served from the cache
        fx.services.boxes.get_box(&ctx, box_id).await.unwrap();
        assert_eq!(fx.metrics.cache_hits(), 1);
    }

    #[tokio::test]
    async fn test_create_box_rejects_invalid_request() {
        let fx = fixture(ServiceSettings::default());
        let request = NewShipmentBox {
            weight: 0.0,
            ..small_box()
        };

        let result = fx.services.boxes.create_box(&OpContext::new(), request).await;
        assert_matches!(result, Err(Error::InvalidRequest(_)));
        // Audited even though rejected
        assert_eq!(fx.audit.records_of(AuditMethod::CreateBox).len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_box() {
        let fx = fixture(ServiceSettings::default());
        let result = fx.services.boxes.get_box(&OpContext::new(), 404).await;
        assert_matches!(result, Err(Error::BoxNotFound(404)));
        assert!(fx.cache.is_empty());
    }

    #[tokio::test]
    async fn test_delete_box_keeps_cached_copy() {
        let fx = fixture(ServiceSettings::default());
        let ctx = OpContext::new();
        let box_id = fx.services.boxes.create_box(&ctx, small_box()).await.unwrap();
        fx.services.boxes.get_box(&ctx, box_id).await.unwrap();

        fx.services.boxes.delete_box(&ctx, box_id).await.unwrap();

        // No invalidation on writes: the cached copy lives until its TTL
        assert!(fx.services.boxes.get_box(&ctx, box_id).await.is_ok());
        assert_matches!(
            fx.services.boxes.delete_box(&ctx, box_id).await,
            Err(Error::BoxNotFound(_))
        );
    }

    #[tokio::test]
    async fn test_list_boxes() {
        let fx = fixture(ServiceSettings::default());
        let ctx = OpContext::new();
        for _ in 0..3 {
            fx.services.boxes.create_box(&ctx, small_box()).await.unwrap();
        }

        let page = fx
            .services
            .boxes
            .list_boxes(&ctx, Page::new(1, 2))
            .await
            .unwrap();

        assert_eq!(page.total_items, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items_per_page, 2);
        assert_eq!(fx.store.commit_count(), 1);

        assert_matches!(
            fx.services.boxes.list_boxes(&ctx, Page::new(0, 10)).await,
            Err(Error::InvalidRequest(_))
        );
    }
}
