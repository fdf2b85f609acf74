//! In-memory tables and the scope statements run against

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::models::{Order, PickupPoint, ShipmentBox};
use crate::error::Result;

/// A row with its soft-delete marker
#[derive(Debug, Clone)]
pub(crate) struct Row<T> {
    pub value: T,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl<T> Row<T> {
    pub fn live(value: T) -> Self {
        Self {
            value,
            deleted_at: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Full contents of the store. Cloned to snapshot a transaction.
#[derive(Debug, Clone)]
pub(crate) struct Tables {
    pub boxes: BTreeMap<i64, Row<ShipmentBox>>,
    pub orders: BTreeMap<i64, Order>,
    pub pickup_points: BTreeMap<i64, Row<PickupPoint>>,
    pub next_box_id: i64,
    pub next_pickup_point_id: i64,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            boxes: BTreeMap::new(),
            orders: BTreeMap::new(),
            pickup_points: BTreeMap::new(),
            next_box_id: 1,
            next_pickup_point_id: 1,
        }
    }
}

/// Store state shared by the root datastore and its transactions
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    /// Last committed contents; readers never see uncommitted writes
    pub committed: parking_lot::RwLock<Tables>,
    /// Held by a transaction for its whole lifetime and by each root write
    pub writer: tokio::sync::Mutex<()>,
    pub fail_next_commit: AtomicBool,
    pub fail_next_rollback: AtomicBool,
    pub commits: AtomicU64,
    pub rollbacks: AtomicU64,
}

/// Where a statement reads and writes.
#[derive(Clone)]
pub(crate) enum Scope<'t> {
    /// Committed tables; each write is its own single-statement transaction
    Root(Arc<SharedState>),
    /// The private snapshot of one open transaction
    Tx(&'t parking_lot::Mutex<Tables>),
}

impl Scope<'_> {
    /// Run a read-only statement
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        match self {
            Scope::Root(shared) => f(&shared.committed.read()),
            Scope::Tx(snapshot) => f(&snapshot.lock()),
        }
    }

    /// Run a writing statement.
    ///
    /// `f` must check before it mutates: an error leaves the tables untouched.
    pub async fn write<R>(&self, f: impl FnOnce(&mut Tables) -> Result<R>) -> Result<R> {
        match self {
            Scope::Root(shared) => {
                let _writer = shared.writer.lock().await;
                let mut tables = shared.committed.write();
                f(&mut tables)
            }
            Scope::Tx(snapshot) => f(&mut snapshot.lock()),
        }
    }
}
