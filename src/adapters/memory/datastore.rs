//! In-memory datastore and unit of work

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use tracing::{debug, instrument, warn};

use super::repositories::{MemBoxRepository, MemOrderRepository, MemPickupPointRepository};
use super::tables::{Row, Scope, SharedState, Tables};
use crate::domain::context::OpContext;
use crate::domain::models::{Order, ShipmentBox};
use crate::domain::ports::{
    BoxRepository, Datastore, OrderRepository, PickupPointRepository, Repositories,
};
use crate::error::{Error, Result};

/// Transactional store kept entirely in process memory.
///
/// Transactions are serialized: one holds the writer lock from begin to
/// commit or rollback, works on a private snapshot of the tables and
/// publishes it atomically on commit. Root writes take the same lock, so a
/// root write issued from inside a transaction waits for it to finish.
pub struct InMemoryDatastore {
    shared: Arc<SharedState>,
    boxes: OnceCell<MemBoxRepository<'static>>,
    orders: OnceCell<MemOrderRepository<'static>>,
    pickup_points: OnceCell<MemPickupPointRepository<'static>>,
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDatastore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SharedState::default()),
            boxes: OnceCell::new(),
            orders: OnceCell::new(),
            pickup_points: OnceCell::new(),
        }
    }

    fn root_scope(&self) -> Scope<'static> {
        Scope::Root(Arc::clone(&self.shared))
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Make the next commit fail; the transaction's writes are discarded.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next rollback report a failure. The writes are still discarded.
    pub fn fail_next_rollback(&self) {
        self.shared.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    /// Number of committed transactions
    pub fn commit_count(&self) -> u64 {
        self.shared.commits.load(Ordering::Relaxed)
    }

    /// Number of rolled back transactions, failed commits included
    pub fn rollback_count(&self) -> u64 {
        self.shared.rollbacks.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    /// Store an order exactly as given, bypassing request validation.
    ///
    /// Lets callers set up states a courier request cannot produce, such as
    /// an order that expired yesterday.
    pub async fn seed_order(&self, order: Order) -> Result<()> {
        self.root_scope()
            .write(|tables| {
                if tables.orders.contains_key(&order.order_id) {
                    return Err(Error::OrderAlreadyExists(order.order_id));
                }
                tables.orders.insert(order.order_id, order);
                Ok(())
            })
            .await
    }

    /// Store a box exactly as given and return its ID
    pub async fn seed_box(&self, shipment_box: ShipmentBox) -> Result<i64> {
        self.root_scope()
            .write(|tables| {
                let id = shipment_box.id;
                if tables.boxes.contains_key(&id) {
                    return Err(Error::BoxAlreadyExists(id.to_string()));
                }
                tables.next_box_id = tables.next_box_id.max(id + 1);
                tables.boxes.insert(id, Row::live(shipment_box));
                Ok(id)
            })
            .await
    }

    fn finish_rollback(&self, err: &Error) {
        self.shared.rollbacks.fetch_add(1, Ordering::Relaxed);
        if self.shared.fail_next_rollback.swap(false, Ordering::SeqCst) {
            warn!(original = %err, "Transaction rollback failed: injected rollback failure");
        } else {
            debug!(error = %err, "Transaction rolled back");
        }
    }
}

impl Repositories for InMemoryDatastore {
    fn boxes(&self) -> &dyn BoxRepository {
        self.boxes
            .get_or_init(|| MemBoxRepository::new(self.root_scope()))
    }

    fn orders(&self) -> &dyn OrderRepository {
        self.orders
            .get_or_init(|| MemOrderRepository::new(self.root_scope()))
    }

    fn pickup_points(&self) -> &dyn PickupPointRepository {
        self.pickup_points
            .get_or_init(|| MemPickupPointRepository::new(self.root_scope()))
    }
}

/// Repositories bound to one transaction's snapshot
pub struct MemTxRepositories<'t> {
    boxes: MemBoxRepository<'t>,
    orders: MemOrderRepository<'t>,
    pickup_points: MemPickupPointRepository<'t>,
}

impl<'t> MemTxRepositories<'t> {
    fn new(snapshot: &'t parking_lot::Mutex<Tables>) -> Self {
        Self {
            boxes: MemBoxRepository::new(Scope::Tx(snapshot)),
            orders: MemOrderRepository::new(Scope::Tx(snapshot)),
            pickup_points: MemPickupPointRepository::new(Scope::Tx(snapshot)),
        }
    }
}

impl Repositories for MemTxRepositories<'_> {
    fn boxes(&self) -> &dyn BoxRepository {
        &self.boxes
    }

    fn orders(&self) -> &dyn OrderRepository {
        &self.orders
    }

    fn pickup_points(&self) -> &dyn PickupPointRepository {
        &self.pickup_points
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    #[instrument(skip_all)]
    async fn with_transaction<T, F>(&self, ctx: &OpContext, f: F) -> Result<T>
    where
        T: Send,
        F: for<'r> FnOnce(&'r dyn Repositories) -> BoxFuture<'r, Result<T>> + Send,
    {
        let _writer = ctx
            .run("begin transaction", async {
                Ok::<_, Error>(self.shared.writer.lock().await)
            })
            .await?;
        let snapshot = parking_lot::Mutex::new(self.shared.committed.read().clone());
        debug!("Transaction begun");

        let outcome = {
            let repos = MemTxRepositories::new(&snapshot);
            match ctx.check("transaction") {
                Ok(()) => ctx.run("transaction", f(&repos)).await,
                Err(e) => Err(e),
            }
        };

        let outcome = outcome.and_then(|value| ctx.check("commit").map(|()| value));

        match outcome {
            Ok(value) => {
                if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
                    self.shared.rollbacks.fetch_add(1, Ordering::Relaxed);
                    return Err(Error::Transaction {
                        stage: "commit",
                        reason: "injected commit failure".to_string(),
                    });
                }

                *self.shared.committed.write() = snapshot.into_inner();
                self.shared.commits.fetch_add(1, Ordering::Relaxed);
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                drop(snapshot);
                self.finish_rollback(&err);
                Err(err)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
