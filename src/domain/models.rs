//! Domain Models
//!
//! Entities, write requests and pagination value objects shared by the
//! repositories and use cases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest page a list request may ask for
pub const MAX_ITEMS_PER_PAGE: i64 = 100;

/// Longest storage period an order may be received with, in days
pub const MAX_STORAGE_DAYS: u32 = 3650;

// =============================================================================
// Shipment Boxes
// =============================================================================

/// Packaging option an order is shipped in.
///
/// When `is_check` is set, `weight` is the declared capacity and heavier
/// orders are either rejected at creation or charged `cost` at issuance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentBox {
    pub id: i64,
    pub name: String,
    pub cost: f64,
    pub is_check: bool,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentBox {
    /// Check whether an order of `order_weight` fits this box.
    pub fn accepts_weight(&self, order_weight: f64) -> bool {
        !self.is_check || order_weight <= self.weight
    }

    /// Surcharge due when issuing an order of `order_weight` in this box.
    pub fn surcharge_for(&self, order_weight: f64) -> f64 {
        surcharge(self.is_check, self.weight, self.cost, order_weight)
    }

    /// Fail with `BoxCapacityExceeded` unless the weight fits.
    pub fn ensure_accepts(&self, order_weight: f64) -> Result<()> {
        if self.accepts_weight(order_weight) {
            Ok(())
        } else {
            Err(Error::BoxCapacityExceeded {
                box_id: self.id,
                order_weight,
                capacity: self.weight,
            })
        }
    }
}

fn surcharge(is_check: bool, capacity: f64, cost: f64, order_weight: f64) -> f64 {
    if is_check && order_weight > capacity {
        cost
    } else {
        0.0
    }
}

/// Request to create a box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShipmentBox {
    pub name: String,
    pub cost: f64,
    pub is_check: bool,
    pub weight: f64,
}

impl NewShipmentBox {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRequest("box name is required".to_string()));
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(Error::InvalidRequest(format!(
                "box cost must be non-negative, got {}",
                self.cost
            )));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(Error::InvalidRequest(format!(
                "box weight must be positive, got {}",
                self.weight
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Orders
// =============================================================================

/// An order stored at a pickup point.
///
/// A returned order is treated as deleted: it is excluded from open lists
/// and can no longer be issued or accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: i64,
    pub client_id: i64,
    pub box_id: i64,
    pub weight: f64,
    pub accepted_at: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn is_issued(&self) -> bool {
        self.issued_at.is_some()
    }

    #[inline]
    pub fn is_returned(&self) -> bool {
        self.returned_at.is_some()
    }

    /// Storage period is over at or after `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Check that this order can be handed to its client at `now`.
    pub fn ensure_issuable(&self, now: DateTime<Utc>) -> Result<()> {
        if self.is_issued() || self.is_returned() {
            return Err(Error::OrderNotIssuable(self.order_id));
        }
        if self.is_expired_at(now) {
            return Err(Error::OrderExpired {
                order_id: self.order_id,
                expires_at: self.expires_at,
            });
        }
        Ok(())
    }
}

/// Request to receive an order from a courier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub order_id: i64,
    pub client_id: i64,
    pub box_id: i64,
    pub weight: f64,
    /// Storage period in days, counted from receipt
    pub expire_in_days: u32,
}

impl NewOrder {
    pub fn validate(&self) -> Result<()> {
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(Error::InvalidRequest(format!(
                "order weight must be positive, got {}",
                self.weight
            )));
        }
        if !(1..=MAX_STORAGE_DAYS).contains(&self.expire_in_days) {
            return Err(Error::InvalidRequest(format!(
                "order storage period must be between 1 and {} days, got {}",
                MAX_STORAGE_DAYS, self.expire_in_days
            )));
        }
        Ok(())
    }

    /// Expiry for an order received at `received_at`
    pub fn expires_at(&self, received_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        received_at
            .checked_add_signed(chrono::Duration::days(i64::from(self.expire_in_days)))
            .ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "order storage period of {} days is out of range",
                    self.expire_in_days
                ))
            })
    }
}

/// Box attributes joined to one order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBoxInfo {
    pub cost: f64,
    pub is_check: bool,
    pub box_weight: f64,
    pub order_weight: f64,
}

impl OrderBoxInfo {
    pub fn surcharge(&self) -> f64 {
        surcharge(self.is_check, self.box_weight, self.cost, self.order_weight)
    }
}

/// Summary of a returned order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnedOrder {
    pub order_id: i64,
    pub client_id: i64,
    pub returned_at: DateTime<Utc>,
}

// =============================================================================
// Pickup Points
// =============================================================================

/// A pickup point (PVZ)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupPoint {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub contact: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a pickup point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPickupPoint {
    pub name: String,
    pub address: String,
    pub contact: String,
}

impl NewPickupPoint {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_address(&self.address)?;
        validate_contact(&self.contact)
    }

    /// Identity used for the duplicate check
    pub fn describe(&self) -> String {
        format!("{} / {} / {}", self.name, self.address, self.contact)
    }
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupPointUpdate {
    pub id: i64,
    pub name: Option<String>,
    pub address: Option<String>,
    pub contact: Option<String>,
}

impl PickupPointUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.address.is_none() && self.contact.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidRequest(
                "pickup point update changes nothing".to_string(),
            ));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(address) = &self.address {
            validate_address(address)?;
        }
        if let Some(contact) = &self.contact {
            validate_contact(contact)?;
        }
        Ok(())
    }

    /// Apply the present fields to `point`
    pub fn apply_to(&self, point: &mut PickupPoint) {
        if let Some(name) = &self.name {
            point.name.clone_from(name);
        }
        if let Some(address) = &self.address {
            point.address.clone_from(address);
        }
        if let Some(contact) = &self.contact {
            point.contact.clone_from(contact);
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(4..=100).contains(&len) {
        return Err(Error::InvalidRequest(format!(
            "pickup point name must be 4 to 100 characters, got {}",
            len
        )));
    }
    Ok(())
}

fn validate_address(address: &str) -> Result<()> {
    if address.chars().count() < 2 {
        return Err(Error::InvalidRequest(
            "pickup point address must be at least 2 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_contact(contact: &str) -> Result<()> {
    if contact.trim().is_empty() {
        return Err(Error::InvalidRequest(
            "pickup point contact is required".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Pagination
// =============================================================================

/// One page of a list request (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub current_page: i64,
    pub items_per_page: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            current_page: 1,
            items_per_page: 10,
        }
    }
}

impl Page {
    pub fn new(current_page: i64, items_per_page: i64) -> Self {
        Self {
            current_page,
            items_per_page,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.current_page < 1 {
            return Err(Error::InvalidRequest(format!(
                "current page must be at least 1, got {}",
                self.current_page
            )));
        }
        if !(1..=MAX_ITEMS_PER_PAGE).contains(&self.items_per_page) {
            return Err(Error::InvalidRequest(format!(
                "items per page must be between 1 and {}, got {}",
                MAX_ITEMS_PER_PAGE, self.items_per_page
            )));
        }
        if (self.current_page - 1).checked_mul(self.items_per_page).is_none() {
            return Err(Error::InvalidRequest(format!(
                "current page {} is out of range",
                self.current_page
            )));
        }
        Ok(())
    }

    /// Rows to skip before this page; saturates for pages past `i64::MAX` rows
    pub fn offset(&self) -> i64 {
        self.current_page
            .saturating_sub(1)
            .max(0)
            .saturating_mul(self.items_per_page.max(0))
    }

    /// Slice an already ordered collection down to this page
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let len = usize::try_from(self.items_per_page).unwrap_or(0);
        items.iter().skip(start).take(len).cloned().collect()
    }
}

/// A page of results with the total count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub current_page: i64,
    /// Number of items actually returned
    pub items_per_page: i64,
    pub total_items: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: Page, total_items: i64) -> Self {
        Self {
            current_page: page.current_page,
            items_per_page: items.len() as i64,
            items,
            total_items,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
