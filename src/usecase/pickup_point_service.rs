//! Pickup point operations

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::cache_aside;
use super::ServiceDeps;
use crate::cache::CacheKey;
use crate::domain::{
    AuditMethod, Datastore, NewPickupPoint, OpContext, Page, Paginated, PickupPoint,
    PickupPointUpdate,
};
use crate::error::{Error, Result};

pub struct PickupPointService<D: Datastore> {
    deps: Arc<ServiceDeps<D>>,
}

impl<D: Datastore> PickupPointService<D> {
    pub(crate) fn new(deps: Arc<ServiceDeps<D>>) -> Self {
        Self { deps }
    }

    /// Create a pickup point unless an identical live one exists.
    ///
    /// The duplicate check and the insert share one transaction.
    #[instrument(skip(self, ctx, request), fields(name = %request.name))]
    pub async fn create_pickup_point(&self, ctx: &OpContext, request: NewPickupPoint) -> Result<i64> {
        self.deps.audit(AuditMethod::CreatePickupPoint, &request).await;
        request.validate()?;

        let ctx = self.deps.scoped(ctx);
        let data = request.clone();
        let pickup_point_id = self
            .deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move {
                    if tx.pickup_points().exists(&data).await? {
                        return Err(Error::PickupPointAlreadyExists(data.describe()));
                    }
                    tx.pickup_points().create(&data).await
                })
            })
            .await?;

        info!(pickup_point_id, "Pickup point created");
        Ok(pickup_point_id)
    }

    /// Fetch a pickup point, from the cache when possible.
    #[instrument(skip(self, ctx))]
    pub async fn get_pickup_point(&self, ctx: &OpContext, pickup_point_id: i64) -> Result<PickupPoint> {
        self.deps
            .audit(AuditMethod::GetPickupPoint, &pickup_point_id)
            .await;

        let ctx = self.deps.scoped(ctx);
        let key = CacheKey::pickup_point(pickup_point_id);
        cache_aside::read_through(
            self.deps.cache.as_ref(),
            &self.deps.metrics,
            &key,
            self.deps.settings.pickup_point_ttl,
            ctx.run(
                "get pickup point",
                self.deps.store.pickup_points().get(pickup_point_id),
            ),
        )
        .await
    }

    /// Apply a partial update.
    #[instrument(skip(self, ctx, update), fields(pickup_point_id = update.id))]
    pub async fn update_pickup_point(&self, ctx: &OpContext, update: PickupPointUpdate) -> Result<()> {
        self.deps.audit(AuditMethod::UpdatePickupPoint, &update).await;
        update.validate()?;

        let ctx = self.deps.scoped(ctx);
        let data = update.clone();
        self.deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move { tx.pickup_points().update(&data).await })
            })
            .await?;

        info!(pickup_point_id = update.id, "Pickup point updated");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_pickup_point(&self, ctx: &OpContext, pickup_point_id: i64) -> Result<()> {
        self.deps
            .audit(AuditMethod::DeletePickupPoint, &pickup_point_id)
            .await;

        let ctx = self.deps.scoped(ctx);
        self.deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move { tx.pickup_points().delete(pickup_point_id).await })
            })
            .await?;

        info!(pickup_point_id, "Pickup point deleted");
        Ok(())
    }

    /// Page through live pickup points, newest first.
    #[instrument(skip(self, ctx))]
    pub async fn list_pickup_points(
        &self,
        ctx: &OpContext,
        page: Page,
    ) -> Result<Paginated<PickupPoint>> {
        self.deps.audit(AuditMethod::ListPickupPoints, &page).await;
        page.validate()?;

        let ctx = self.deps.scoped(ctx);
        let (total, items) = self
            .deps
            .store
            .with_transaction(&ctx, move |tx| {
                Box::pin(async move {
                    let total = tx.pickup_points().count().await?;
                    let items = tx.pickup_points().list(&page).await?;
                    Ok::<_, Error>((total, items))
                })
            })
            .await?;

        debug!(total, returned = items.len(), "Listed pickup points");
        Ok(Paginated::new(items, page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecase::fixture::fixture;
    use crate::usecase::ServiceSettings;
    use assert_matches::assert_matches;

    fn central() -> NewPickupPoint {
        NewPickupPoint {
            name: "Central".to_string(),
            address: "1 Main St".to_string(),
            contact: "+7 900 000 00 00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let fx = fixture(ServiceSettings::default());
        let ctx = OpContext::new();

        fx.services
            .pickup_points
            .create_pickup_point(&ctx, central())
            .await
            .unwrap();
        let result = fx
            .services
            .pickup_points
            .create_pickup_point(&ctx, central())
            .await;

        assert_matches!(result, Err(Error::PickupPointAlreadyExists(_)));
        assert_eq!(fx.store.rollback_count(), 1);

        let page = fx
            .services
            .pickup_points
            .list_pickup_points(&ctx, Page::default())
            .await
            .unwrap();
        assert_eq!(page.total_items, 1);
    }

    #[tokio::test]
    async fn test_get_is_cached() {
        let fx = fixture(ServiceSettings::default());
        let ctx = OpContext::new();
        let id = fx
            .services
            .pickup_points
            .create_pickup_point(&ctx, central())
            .await
            .unwrap();

        let first = fx.services.pickup_points.get_pickup_point(&ctx, id).await.unwrap();
        let second = fx.services.pickup_points.get_pickup_point(&ctx, id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.metrics.cache_misses(), 1);
        assert_eq!(fx.metrics.cache_hits(), 1);
        assert!(fx.cache.get(&CacheKey::pickup_point(id).render()).is_ok());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let fx = fixture(ServiceSettings::default());
        let ctx = OpContext::new();
        let id = fx
            .services
            .pickup_points
            .create_pickup_point(&ctx, central())
            .await
            .unwrap();

        let update = PickupPointUpdate {
            id,
            address: Some("2 Side St".to_string()),
            ..Default::default()
        };
        fx.services
            .pickup_points
            .update_pickup_point(&ctx, update)
            .await
            .unwrap();

        let point = fx.services.pickup_points.get_pickup_point(&ctx, id).await.unwrap();
        assert_eq!(point.address, "2 Side St");
        assert_eq!(point.name, "Central");

        fx.services
            .pickup_points
            .delete_pickup_point(&ctx, id)
            .await
            .unwrap();
        assert_matches!(
            fx.services.pickup_points.delete_pickup_point(&ctx, id).await,
            Err(Error::PickupPointNotFound(_))
        );
    }

    #[tokio::test]
    async fn test_update_missing_point() {
        let fx = fixture(ServiceSettings::default());
        let update = PickupPointUpdate {
            id: 99,
            name: Some("Northern".to_string()),
            ..Default::default()
        };

        let result = fx
            .services
            .pickup_points
            .update_pickup_point(&OpContext::new(), update)
            .await;
        assert_matches!(result, Err(Error::PickupPointNotFound(99)));
    }
}
