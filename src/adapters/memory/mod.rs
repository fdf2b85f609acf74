//! In-Memory Adapter
//!
//! A transactional store held in process memory. Used by tests and by the
//! `memory` store backend when no database is available.

mod datastore;
mod repositories;
mod tables;

pub use datastore::{InMemoryDatastore, MemTxRepositories};
pub use repositories::{MemBoxRepository, MemOrderRepository, MemPickupPointRepository};
