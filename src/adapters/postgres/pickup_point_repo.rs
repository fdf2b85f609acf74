//! Pickup point repository over PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::debug;

use super::Executor;
use crate::domain::models::{NewPickupPoint, Page, PickupPoint, PickupPointUpdate};
use crate::domain::ports::PickupPointRepository;
use crate::error::{is_unique_violation, Error, Result};

const PICKUP_POINT_COLUMNS: &str = "id, name, address, contact, created_at, updated_at";

/// `pvz` table access
#[derive(Clone)]
pub struct PgPickupPointRepository<'t> {
    executor: Executor<'t>,
}

impl<'t> PgPickupPointRepository<'t> {
    pub(crate) fn new(executor: Executor<'t>) -> Self {
        Self { executor }
    }
}

fn pickup_point_from_row(row: &Row) -> Result<PickupPoint> {
    Ok(PickupPoint {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        contact: row.try_get("contact")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Build the `UPDATE` for the fields present in `update`.
///
/// Parameters are numbered in the order they are pushed; `updated_at` and the
/// row ID always come last.
fn update_statement<'a>(
    update: &'a PickupPointUpdate,
    now: &'a DateTime<Utc>,
) -> (String, Vec<&'a (dyn ToSql + Sync)>) {
    let mut assignments = Vec::new();
    let mut params: Vec<&'a (dyn ToSql + Sync)> = Vec::new();

    for (column, value) in [
        ("name", &update.name),
        ("address", &update.address),
        ("contact", &update.contact),
    ] {
        if let Some(value) = value {
            params.push(value);
            assignments.push(format!("{} = ${}", column, params.len()));
        }
    }

    params.push(now);
    assignments.push(format!("updated_at = ${}", params.len()));

    params.push(&update.id);
    let sql = format!(
        "UPDATE pvz SET {} WHERE id = ${} AND deleted_at IS NULL",
        assignments.join(", "),
        params.len()
    );

    (sql, params)
}

#[async_trait]
impl PickupPointRepository for PgPickupPointRepository<'_> {
    async fn create(&self, data: &NewPickupPoint) -> Result<i64> {
        debug!(name = %data.name, "Inserting pickup point");

        let row = self
            .executor
            .query_one(
                "INSERT INTO pvz(name, address, contact) VALUES ($1, $2, $3) RETURNING id",
                &[&data.name, &data.address, &data.contact],
            )
            .await
            .map_err(|e| match e {
                Error::Postgres(pg) if is_unique_violation(&pg) => {
                    Error::PickupPointAlreadyExists(data.describe())
                }
                other => other,
            })?;

        Ok(row.try_get(0)?)
    }

    async fn exists(&self, data: &NewPickupPoint) -> Result<bool> {
        let row = self
            .executor
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pvz WHERE name = $1 AND address = $2 \
                 AND contact = $3 AND deleted_at IS NULL)",
                &[&data.name, &data.address, &data.contact],
            )
            .await?;

        Ok(row.try_get(0)?)
    }

    async fn get(&self, pickup_point_id: i64) -> Result<PickupPoint> {
        let sql = format!(
            "SELECT {} FROM pvz WHERE id = $1 AND deleted_at IS NULL",
            PICKUP_POINT_COLUMNS
        );
        match self.executor.query_opt(&sql, &[&pickup_point_id]).await? {
            Some(row) => pickup_point_from_row(&row),
            None => Err(Error::PickupPointNotFound(pickup_point_id)),
        }
    }

    async fn list(&self, page: &Page) -> Result<Vec<PickupPoint>> {
        let sql = format!(
            "SELECT {} FROM pvz WHERE deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC OFFSET $1 LIMIT $2",
            PICKUP_POINT_COLUMNS
        );
        let rows = self
            .executor
            .query(&sql, &[&page.offset(), &page.items_per_page])
            .await?;

        rows.iter().map(pickup_point_from_row).collect()
    }

    async fn count(&self) -> Result<i64> {
        self.executor
            .count("SELECT COUNT(*) FROM pvz WHERE deleted_at IS NULL")
            .await
    }

    async fn update(&self, update: &PickupPointUpdate) -> Result<()> {
        let now = Utc::now();
        let (sql, params) = update_statement(update, &now);

        let rows = self.executor.execute(&sql, &params).await?;
        if rows == 0 {
            return Err(Error::PickupPointNotFound(update.id));
        }
        Ok(())
    }

    async fn delete(&self, pickup_point_id: i64) -> Result<()> {
        let rows = self
            .executor
            .execute(
                "UPDATE pvz SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
                &[&Utc::now(), &pickup_point_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::PickupPointNotFound(pickup_point_id));
        }
        Ok(())
    }
}
