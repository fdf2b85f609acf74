//! Domain Layer
//!
//! # Architecture
//!
//! The domain layer is organized into:
//!
//! - **Models** (`models.rs`) - Entities, write requests and pagination
//! - **Ports** (`ports.rs`) - Trait abstractions for stores, cache and audit
//! - **Events** (`events.rs`) - Audit records emitted per operation
//! - **Context** (`context.rs`) - Cancellation and deadline for one operation
//!
//! # Usage
//!
//! ```ignore
//! use pickup_point_service::domain::{Datastore, OpContext, Page};
//!
//! async fn count_boxes<D: Datastore>(store: &D) -> Result<i64> {
//!     store
//!         .with_transaction(&OpContext::new(), |tx| Box::pin(tx.boxes().count()))
//!         .await
//! }
//! ```

pub mod context;
pub mod events;
pub mod models;
pub mod ports;

// Re-export commonly used types
pub use context::OpContext;
pub use events::{AuditMethod, AuditRecord};
pub use models::{
    NewOrder, NewPickupPoint, NewShipmentBox, Order, OrderBoxInfo, Page, Paginated, PickupPoint,
    PickupPointUpdate, ReturnedOrder, ShipmentBox, MAX_ITEMS_PER_PAGE, MAX_STORAGE_DAYS,
};
pub use ports::{
    AuditPublisher, BoxRepository, CacheStore, Datastore, OrderRepository, PickupPointRepository,
    Repositories,
};
