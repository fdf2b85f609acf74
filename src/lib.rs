//! Pickup Point Service
//!
//! Backend for a parcel pickup point: shipment boxes, pickup points and the
//! orders stored there, with a sharded in-process TTL cache in front of the
//! relational store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Use Cases                               │
//! │   BoxService │ PickupPointService │ OrderService                 │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │        ShardedCache          │      Datastore (UnitOfWork)      │
//! │  32 shards, TTL, sweeper     │  PgDatastore │ InMemoryDatastore │
//! └──────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Reads of boxes and pickup points are cache-aside. Writes that depend on
//! another entity (an order against its box, a batch issuance against every
//! order in it) run inside one transaction.
//!
//! # Modules
//!
//! - [`adapters`] - Datastore and audit publisher implementations
//! - [`cache`] - Sharded TTL cache with background sweeping
//! - [`domain`] - Entities, ports, audit records and operation context
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus counters
//! - [`usecase`] - Business operations

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod usecase;

// Re-export commonly used types
pub use cache::{CacheConfig, ShardedCache};
pub use domain::OpContext;
pub use error::{Error, ErrorKind, Result};
pub use usecase::{ServiceSettings, Services, WeightCheckPolicy};
