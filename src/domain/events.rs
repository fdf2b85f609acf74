//! Audit Records
//!
//! Every business operation emits one audit record describing the call:
//! which operation ran, the request it was given and when.
//!
//! # Example
//!
//! ```ignore
//! let record = AuditRecord::new(AuditMethod::IssueOrders, &request)?;
//! publisher.publish(record).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Operation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditMethod {
    // =========================================================================
    // Box Operations
    // =========================================================================
    CreateBox,
    DeleteBox,
    GetBox,
    ListBoxes,

    // =========================================================================
    // Pickup Point Operations
    // =========================================================================
    CreatePickupPoint,
    GetPickupPoint,
    UpdatePickupPoint,
    DeletePickupPoint,
    ListPickupPoints,

    // =========================================================================
    // Order Operations
    // =========================================================================
    CreateOrder,
    IssueOrders,
    AcceptOrder,
    ReturnOrder,
    ListOrders,
    ListReturnedOrders,
    ListUniqueClients,
}

impl AuditMethod {
    /// Stable method name
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditMethod::CreateBox => "CreateBox",
            AuditMethod::DeleteBox => "DeleteBox",
            AuditMethod::GetBox => "GetBox",
            AuditMethod::ListBoxes => "ListBoxes",
            AuditMethod::CreatePickupPoint => "CreatePickupPoint",
            AuditMethod::GetPickupPoint => "GetPickupPoint",
            AuditMethod::UpdatePickupPoint => "UpdatePickupPoint",
            AuditMethod::DeletePickupPoint => "DeletePickupPoint",
            AuditMethod::ListPickupPoints => "ListPickupPoints",
            AuditMethod::CreateOrder => "CreateOrder",
            AuditMethod::IssueOrders => "IssueOrders",
            AuditMethod::AcceptOrder => "AcceptOrder",
            AuditMethod::ReturnOrder => "ReturnOrder",
            AuditMethod::ListOrders => "ListOrders",
            AuditMethod::ListReturnedOrders => "ListReturnedOrders",
            AuditMethod::ListUniqueClients => "ListUniqueClients",
        }
    }
}

impl std::fmt::Display for AuditMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one business operation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub method: AuditMethod,
    /// The request as JSON
    pub request: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Record a call of `method` with `request`
    pub fn new<R: Serialize + ?Sized>(method: AuditMethod, request: &R) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            method,
            request: serde_json::to_value(request)?,
            timestamp: Utc::now(),
        })
    }

    /// Get the method name.
    pub fn method_name(&self) -> &'static str {
        self.method.as_str()
    }
}
