//! Order repository over PostgreSQL

use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use tracing::debug;

use super::Executor;
use crate::domain::models::{NewOrder, Order, OrderBoxInfo, Page, ReturnedOrder};
use crate::domain::ports::OrderRepository;
use crate::error::{is_unique_violation, Error, Result};

const ORDER_COLUMNS: &str = "order_id, client_id, box_id, weight, accepted_at, issued_at, \
                             returned_at, expires_at, created_at, updated_at";

/// `orders` table access
#[derive(Clone)]
pub struct PgOrderRepository<'t> {
    executor: Executor<'t>,
}

impl<'t> PgOrderRepository<'t> {
    pub(crate) fn new(executor: Executor<'t>) -> Self {
        Self { executor }
    }
}

fn order_from_row(row: &Row) -> Result<Order> {
    Ok(Order {
        order_id: row.try_get("order_id")?,
        client_id: row.try_get("client_id")?,
        box_id: row.try_get("box_id")?,
        weight: row.try_get("weight")?,
        accepted_at: row.try_get("accepted_at")?,
        issued_at: row.try_get("issued_at")?,
        returned_at: row.try_get("returned_at")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl OrderRepository for PgOrderRepository<'_> {
    async fn create(&self, data: &NewOrder) -> Result<()> {
        debug!(order_id = data.order_id, box_id = data.box_id, "Inserting order");

        let expires_at = data.expires_at(Utc::now())?;
        self.executor
            .execute(
                "INSERT INTO orders(order_id, client_id, expires_at, weight, box_id) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &data.order_id,
                    &data.client_id,
                    &expires_at,
                    &data.weight,
                    &data.box_id,
                ],
            )
            .await
            .map_err(|e| match e {
                Error::Postgres(pg) if is_unique_violation(&pg) => {
                    Error::OrderAlreadyExists(data.order_id)
                }
                other => other,
            })?;

        Ok(())
    }

    async fn get(&self, order_id: i64) -> Result<Order> {
        let sql = format!("SELECT {} FROM orders WHERE order_id = $1", ORDER_COLUMNS);
        match self.executor.query_opt(&sql, &[&order_id]).await? {
            Some(row) => order_from_row(&row),
            None => Err(Error::OrderNotFound(order_id)),
        }
    }

    async fn client_of(&self, order_id: i64) -> Result<i64> {
        let row = self
            .executor
            .query_opt(
                "SELECT client_id FROM orders \
                 WHERE order_id = $1 AND returned_at IS NULL AND issued_at IS NULL",
                &[&order_id],
            )
            .await?
            .ok_or(Error::OrderNotFound(order_id))?;

        Ok(row.try_get(0)?)
    }

    async fn mark_issued(&self, order_id: i64, client_id: i64) -> Result<()> {
        let rows = self
            .executor
            .execute(
                "UPDATE orders SET issued_at = $1, updated_at = $1 \
                 WHERE order_id = $2 AND client_id = $3 \
                 AND returned_at IS NULL AND issued_at IS NULL",
                &[&Utc::now(), &order_id, &client_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::MultipleClients {
                order_id,
                client_id,
            });
        }
        Ok(())
    }

    async fn box_info(&self, order_id: i64) -> Result<OrderBoxInfo> {
        let row = self
            .executor
            .query_opt(
                "SELECT b.cost, b.is_check, b.weight AS box_weight, o.weight AS order_weight \
                 FROM box b JOIN orders o ON b.id = o.box_id WHERE o.order_id = $1",
                &[&order_id],
            )
            .await?
            .ok_or(Error::OrderNotFound(order_id))?;

        Ok(OrderBoxInfo {
            cost: row.try_get("cost")?,
            is_check: row.try_get("is_check")?,
            box_weight: row.try_get("box_weight")?,
            order_weight: row.try_get("order_weight")?,
        })
    }

    async fn mark_accepted(&self, order_id: i64, client_id: i64) -> Result<()> {
        let rows = self
            .executor
            .execute(
                "UPDATE orders SET accepted_at = $1, updated_at = $1 \
                 WHERE order_id = $2 AND client_id = $3 \
                 AND returned_at IS NULL AND accepted_at IS NULL",
                &[&Utc::now(), &order_id, &client_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn mark_returned(&self, order_id: i64) -> Result<()> {
        let rows = self
            .executor
            .execute(
                "UPDATE orders SET returned_at = $1, updated_at = $1 \
                 WHERE order_id = $2 AND returned_at IS NULL",
                &[&Utc::now(), &order_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn count_open(&self) -> Result<i64> {
        self.executor
            .count("SELECT COUNT(order_id) FROM orders WHERE returned_at IS NULL")
            .await
    }

    async fn list_open(&self, page: &Page) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE returned_at IS NULL \
             ORDER BY created_at DESC, order_id DESC OFFSET $1 LIMIT $2",
            ORDER_COLUMNS
        );
        let rows = self
            .executor
            .query(&sql, &[&page.offset(), &page.items_per_page])
            .await?;

        rows.iter().map(order_from_row).collect()
    }

    async fn count_returned(&self) -> Result<i64> {
        self.executor
            .count("SELECT COUNT(order_id) FROM orders WHERE returned_at IS NOT NULL")
            .await
    }

    async fn list_returned(&self, page: &Page) -> Result<Vec<ReturnedOrder>> {
        let rows = self
            .executor
            .query(
                "SELECT order_id, client_id, returned_at FROM orders \
                 WHERE returned_at IS NOT NULL \
                 ORDER BY returned_at DESC, order_id DESC OFFSET $1 LIMIT $2",
                &[&page.offset(), &page.items_per_page],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<ReturnedOrder> {
                Ok(ReturnedOrder {
                    order_id: row.try_get("order_id")?,
                    client_id: row.try_get("client_id")?,
                    returned_at: row.try_get("returned_at")?,
                })
            })
            .collect()
    }

    async fn count_unique_clients(&self) -> Result<i64> {
        self.executor
            .count("SELECT COUNT(DISTINCT client_id) FROM orders")
            .await
    }

    async fn list_unique_clients(&self, page: &Page) -> Result<Vec<i64>> {
        let rows = self
            .executor
            .query(
                "SELECT DISTINCT client_id FROM orders ORDER BY client_id OFFSET $1 LIMIT $2",
                &[&page.offset(), &page.items_per_page],
            )
            .await?;

        rows.iter()
            .map(|row| row.try_get(0).map_err(Error::from))
            .collect()
    }
}
