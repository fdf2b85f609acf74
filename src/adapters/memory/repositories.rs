//! In-memory repositories

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;

use super::tables::{Row, Scope};
use crate::domain::models::{
    NewOrder, NewPickupPoint, NewShipmentBox, Order, OrderBoxInfo, Page, PickupPoint,
    PickupPointUpdate, ReturnedOrder, ShipmentBox,
};
use crate::domain::ports::{BoxRepository, OrderRepository, PickupPointRepository};
use crate::error::{Error, Result};

// =============================================================================
// Boxes
// =============================================================================

#[derive(Clone)]
pub struct MemBoxRepository<'t> {
    scope: Scope<'t>,
}

impl<'t> MemBoxRepository<'t> {
    pub(crate) fn new(scope: Scope<'t>) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl BoxRepository for MemBoxRepository<'_> {
    async fn create(&self, data: &NewShipmentBox) -> Result<i64> {
        self.scope
            .write(|tables| {
                let id = tables.next_box_id;
                tables.next_box_id += 1;

                let now = Utc::now();
                tables.boxes.insert(
                    id,
                    Row::live(ShipmentBox {
                        id,
                        name: data.name.clone(),
                        cost: data.cost,
                        is_check: data.is_check,
                        weight: data.weight,
                        created_at: now,
                        updated_at: now,
                    }),
                );
                Ok(id)
            })
            .await
    }

    async fn get(&self, box_id: i64) -> Result<ShipmentBox> {
        self.scope.read(|tables| {
            tables
                .boxes
                .get(&box_id)
                .filter(|row| row.is_live())
                .map(|row| row.value.clone())
                .ok_or(Error::BoxNotFound(box_id))
        })
    }

    async fn delete(&self, box_id: i64) -> Result<()> {
        self.scope
            .write(|tables| match tables.boxes.get_mut(&box_id) {
                Some(row) if row.is_live() => {
                    row.deleted_at = Some(Utc::now());
                    Ok(())
                }
                _ => Err(Error::BoxNotFound(box_id)),
            })
            .await
    }

    async fn count(&self) -> Result<i64> {
        Ok(self
            .scope
            .read(|tables| tables.boxes.values().filter(|r| r.is_live()).count() as i64))
    }

    async fn list(&self, page: &Page) -> Result<Vec<ShipmentBox>> {
        Ok(self.scope.read(|tables| {
            let mut live: Vec<ShipmentBox> = tables
                .boxes
                .values()
                .filter(|r| r.is_live())
                .map(|r| r.value.clone())
                .collect();
            live.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            page.slice(&live)
        }))
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Clone)]
pub struct MemOrderRepository<'t> {
    scope: Scope<'t>,
}

impl<'t> MemOrderRepository<'t> {
    pub(crate) fn new(scope: Scope<'t>) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl OrderRepository for MemOrderRepository<'_> {
    async fn create(&self, data: &NewOrder) -> Result<()> {
        self.scope
            .write(|tables| {
                if tables.orders.contains_key(&data.order_id) {
                    return Err(Error::OrderAlreadyExists(data.order_id));
                }
                if !tables.boxes.contains_key(&data.box_id) {
                    return Err(Error::BoxNotFound(data.box_id));
                }

                let now = Utc::now();
                let expires_at = data.expires_at(now)?;
                tables.orders.insert(
                    data.order_id,
                    Order {
                        order_id: data.order_id,
                        client_id: data.client_id,
                        box_id: data.box_id,
                        weight: data.weight,
                        accepted_at: None,
                        issued_at: None,
                        returned_at: None,
                        expires_at,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(())
            })
            .await
    }

    async fn get(&self, order_id: i64) -> Result<Order> {
        self.scope.read(|tables| {
            tables
                .orders
                .get(&order_id)
                .cloned()
                .ok_or(Error::OrderNotFound(order_id))
        })
    }

    async fn client_of(&self, order_id: i64) -> Result<i64> {
        self.scope.read(|tables| {
            tables
                .orders
                .get(&order_id)
                .filter(|o| !o.is_issued() && !o.is_returned())
                .map(|o| o.client_id)
                .ok_or(Error::OrderNotFound(order_id))
        })
    }

    async fn mark_issued(&self, order_id: i64, client_id: i64) -> Result<()> {
        self.scope
            .write(|tables| match tables.orders.get_mut(&order_id) {
                Some(order)
                    if order.client_id == client_id
                        && !order.is_issued()
                        && !order.is_returned() =>
                {
                    let now = Utc::now();
                    order.issued_at = Some(now);
                    order.updated_at = now;
                    Ok(())
                }
                _ => Err(Error::MultipleClients {
                    order_id,
                    client_id,
                }),
            })
            .await
    }

    async fn box_info(&self, order_id: i64) -> Result<OrderBoxInfo> {
        self.scope.read(|tables| {
            let order = tables
                .orders
                .get(&order_id)
                .ok_or(Error::OrderNotFound(order_id))?;
            let shipment_box = tables
                .boxes
                .get(&order.box_id)
                .ok_or(Error::OrderNotFound(order_id))?;

            Ok(OrderBoxInfo {
                cost: shipment_box.value.cost,
                is_check: shipment_box.value.is_check,
                box_weight: shipment_box.value.weight,
                order_weight: order.weight,
            })
        })
    }

    async fn mark_accepted(&self, order_id: i64, client_id: i64) -> Result<()> {
        self.scope
            .write(|tables| match tables.orders.get_mut(&order_id) {
                Some(order)
                    if order.client_id == client_id
                        && order.accepted_at.is_none()
                        && !order.is_returned() =>
                {
                    let now = Utc::now();
                    order.accepted_at = Some(now);
                    order.updated_at = now;
                    Ok(())
                }
                _ => Err(Error::OrderNotFound(order_id)),
            })
            .await
    }

    async fn mark_returned(&self, order_id: i64) -> Result<()> {
        self.scope
            .write(|tables| match tables.orders.get_mut(&order_id) {
                Some(order) if !order.is_returned() => {
                    let now = Utc::now();
                    order.returned_at = Some(now);
                    order.updated_at = now;
                    Ok(())
                }
                _ => Err(Error::OrderNotFound(order_id)),
            })
            .await
    }

    async fn count_open(&self) -> Result<i64> {
        Ok(self.scope.read(|tables| {
            tables.orders.values().filter(|o| !o.is_returned()).count() as i64
        }))
    }

    async fn list_open(&self, page: &Page) -> Result<Vec<Order>> {
        Ok(self.scope.read(|tables| {
            let mut open: Vec<Order> = tables
                .orders
                .values()
                .filter(|o| !o.is_returned())
                .cloned()
                .collect();
            open.sort_by(|a, b| (b.created_at, b.order_id).cmp(&(a.created_at, a.order_id)));
            page.slice(&open)
        }))
    }

    async fn count_returned(&self) -> Result<i64> {
        Ok(self.scope.read(|tables| {
            tables.orders.values().filter(|o| o.is_returned()).count() as i64
        }))
    }

    async fn list_returned(&self, page: &Page) -> Result<Vec<ReturnedOrder>> {
        Ok(self.scope.read(|tables| {
            let mut returned: Vec<ReturnedOrder> = tables
                .orders
                .values()
                .filter_map(|o| {
                    o.returned_at.map(|returned_at| ReturnedOrder {
                        order_id: o.order_id,
                        client_id: o.client_id,
                        returned_at,
                    })
                })
                .collect();
            returned.sort_by(|a, b| {
                (b.returned_at, b.order_id).cmp(&(a.returned_at, a.order_id))
            });
            page.slice(&returned)
        }))
    }

    async fn count_unique_clients(&self) -> Result<i64> {
        Ok(self.scope.read(|tables| {
            tables
                .orders
                .values()
                .map(|o| o.client_id)
                .collect::<BTreeSet<_>>()
                .len() as i64
        }))
    }

    async fn list_unique_clients(&self, page: &Page) -> Result<Vec<i64>> {
        Ok(self.scope.read(|tables| {
            let clients: Vec<i64> = tables
                .orders
                .values()
                .map(|o| o.client_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            page.slice(&clients)
        }))
    }
}

// =============================================================================
// Pickup Points
// =============================================================================

#[derive(Clone)]
pub struct MemPickupPointRepository<'t> {
    scope: Scope<'t>,
}

impl<'t> MemPickupPointRepository<'t> {
    pub(crate) fn new(scope: Scope<'t>) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl PickupPointRepository for MemPickupPointRepository<'_> {
    async fn create(&self, data: &NewPickupPoint) -> Result<i64> {
        self.scope
            .write(|tables| {
                let id = tables.next_pickup_point_id;
                tables.next_pickup_point_id += 1;

                let now = Utc::now();
                tables.pickup_points.insert(
                    id,
                    Row::live(PickupPoint {
                        id,
                        name: data.name.clone(),
                        address: data.address.clone(),
                        contact: data.contact.clone(),
                        created_at: now,
                        updated_at: now,
                    }),
                );
                Ok(id)
            })
            .await
    }

    async fn exists(&self, data: &NewPickupPoint) -> Result<bool> {
        Ok(self.scope.read(|tables| {
            tables.pickup_points.values().any(|row| {
                row.is_live()
                    && row.value.name == data.name
                    && row.value.address == data.address
                    && row.value.contact == data.contact
            })
        }))
    }

    async fn get(&self, pickup_point_id: i64) -> Result<PickupPoint> {
        self.scope.read(|tables| {
            tables
                .pickup_points
                .get(&pickup_point_id)
                .filter(|row| row.is_live())
                .map(|row| row.value.clone())
                .ok_or(Error::PickupPointNotFound(pickup_point_id))
        })
    }

    async fn list(&self, page: &Page) -> Result<Vec<PickupPoint>> {
        Ok(self.scope.read(|tables| {
            let mut live: Vec<PickupPoint> = tables
                .pickup_points
                .values()
                .filter(|r| r.is_live())
                .map(|r| r.value.clone())
                .collect();
            live.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            page.slice(&live)
        }))
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.scope.read(|tables| {
            tables.pickup_points.values().filter(|r| r.is_live()).count() as i64
        }))
    }

    async fn update(&self, update: &PickupPointUpdate) -> Result<()> {
        self.scope
            .write(|tables| match tables.pickup_points.get_mut(&update.id) {
                Some(row) if row.is_live() => {
                    update.apply_to(&mut row.value);
                    row.value.updated_at = Utc::now();
                    Ok(())
                }
                _ => Err(Error::PickupPointNotFound(update.id)),
            })
            .await
    }

    async fn delete(&self, pickup_point_id: i64) -> Result<()> {
        self.scope
            .write(|tables| match tables.pickup_points.get_mut(&pickup_point_id) {
                Some(row) if row.is_live() => {
                    row.deleted_at = Some(Utc::now());
                    Ok(())
                }
                _ => Err(Error::PickupPointNotFound(pickup_point_id)),
            })
            .await
    }
}
