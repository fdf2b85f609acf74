//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  Datastore │ Repositories │ *Repository │ AuditPublisher   │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ PgDatastore │ InMemoryDatastore │ LoggingAuditPublisher    │ │
//! │  │ InMemoryAuditCollector                                     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sharded cache implements its port (`CacheStore`) in `crate::cache`.
//!
//! # Usage
//!
//! ```ignore
//! use pickup_point_service::adapters::{PgConfig, PgDatastore};
//! use pickup_point_service::domain::Repositories;
//!
//! let store = PgDatastore::new(PgConfig::default().create_pool()?);
//! let total = store.boxes().count().await?;
//! ```

pub mod memory;
pub mod postgres;

mod audit_publisher;

pub use audit_publisher::{InMemoryAuditCollector, LoggingAuditPublisher};
pub use memory::InMemoryDatastore;
pub use postgres::{PgConfig, PgDatastore};
