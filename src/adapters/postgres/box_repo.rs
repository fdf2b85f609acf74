//! Shipment box repository over PostgreSQL

use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use tracing::debug;

use super::Executor;
use crate::domain::models::{NewShipmentBox, Page, ShipmentBox};
use crate::domain::ports::BoxRepository;
use crate::error::{is_unique_violation, Error, Result};

const BOX_COLUMNS: &str = "id, name, cost, is_check, weight, created_at, updated_at";

/// `box` table access
#[derive(Clone)]
pub struct PgBoxRepository<'t> {
    executor: Executor<'t>,
}

impl<'t> PgBoxRepository<'t> {
    pub(crate) fn new(executor: Executor<'t>) -> Self {
        Self { executor }
    }
}

fn box_from_row(row: &Row) -> Result<ShipmentBox> {
    Ok(ShipmentBox {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        cost: row.try_get("cost")?,
        is_check: row.try_get("is_check")?,
        weight: row.try_get("weight")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl BoxRepository for PgBoxRepository<'_> {
    async fn create(&self, data: &NewShipmentBox) -> Result<i64> {
        debug!(name = %data.name, "Inserting box");

        let row = self
            .executor
            .query_one(
                "INSERT INTO box(name, cost, is_check, weight) VALUES ($1, $2, $3, $4) RETURNING id",
                &[&data.name, &data.cost, &data.is_check, &data.weight],
            )
            .await
            .map_err(|e| match e {
                Error::Postgres(pg) if is_unique_violation(&pg) => {
                    Error::BoxAlreadyExists(data.name.clone())
                }
                other => other,
            })?;

        Ok(row.try_get(0)?)
    }

    async fn get(&self, box_id: i64) -> Result<ShipmentBox> {
        let sql = format!(
            "SELECT {} FROM box WHERE id = $1 AND deleted_at IS NULL",
            BOX_COLUMNS
        );
        match self.executor.query_opt(&sql, &[&box_id]).await? {
            Some(row) => box_from_row(&row),
            None => Err(Error::BoxNotFound(box_id)),
        }
    }

    async fn delete(&self, box_id: i64) -> Result<()> {
        let rows = self
            .executor
            .execute(
                "UPDATE box SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
                &[&Utc::now(), &box_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::BoxNotFound(box_id));
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        self.executor
            .count("SELECT COUNT(*) FROM box WHERE deleted_at IS NULL")
            .await
    }

    async fn list(&self, page: &Page) -> Result<Vec<ShipmentBox>> {
        let sql = format!(
            "SELECT {} FROM box WHERE deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC OFFSET $1 LIMIT $2",
            BOX_COLUMNS
        );
        let rows = self
            .executor
            .query(&sql, &[&page.offset(), &page.items_per_page])
            .await?;

        rows.iter().map(box_from_row).collect()
    }
}
