//! PostgreSQL datastore and unit of work

use async_trait::async_trait;
use deadpool_postgres::{Pool, Transaction};
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use tracing::{debug, instrument, warn};

use super::{Executor, PgBoxRepository, PgOrderRepository, PgPickupPointRepository};
use crate::domain::context::OpContext;
use crate::domain::ports::{
    BoxRepository, Datastore, OrderRepository, PickupPointRepository, Repositories,
};
use crate::error::{Error, Result};

/// Root datastore over a connection pool.
///
/// Each root repository is built on first access and reused for the
/// lifetime of the datastore.
pub struct PgDatastore {
    pool: Pool,
    boxes: OnceCell<PgBoxRepository<'static>>,
    orders: OnceCell<PgOrderRepository<'static>>,
    pickup_points: OnceCell<PgPickupPointRepository<'static>>,
}

impl PgDatastore {
    /// Create a datastore over an existing pool
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            boxes: OnceCell::new(),
            orders: OnceCell::new(),
            pickup_points: OnceCell::new(),
        }
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Round-trip a trivial query to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn root_executor(&self) -> Executor<'static> {
        Executor::Pool(self.pool.clone())
    }
}

impl Repositories for PgDatastore {
    fn boxes(&self) -> &dyn BoxRepository {
        self.boxes
            .get_or_init(|| PgBoxRepository::new(self.root_executor()))
    }

    fn orders(&self) -> &dyn OrderRepository {
        self.orders
            .get_or_init(|| PgOrderRepository::new(self.root_executor()))
    }

    fn pickup_points(&self) -> &dyn PickupPointRepository {
        self.pickup_points
            .get_or_init(|| PgPickupPointRepository::new(self.root_executor()))
    }
}

/// Repositories bound to one open transaction.
///
/// Built fresh for every `with_transaction` call and dropped before the
/// transaction is finished.
pub struct PgTxRepositories<'t> {
    boxes: PgBoxRepository<'t>,
    orders: PgOrderRepository<'t>,
    pickup_points: PgPickupPointRepository<'t>,
}

impl<'t> PgTxRepositories<'t> {
    fn new(tx: &'t Transaction<'t>) -> Self {
        Self {
            boxes: PgBoxRepository::new(Executor::Transaction(tx)),
            orders: PgOrderRepository::new(Executor::Transaction(tx)),
            pickup_points: PgPickupPointRepository::new(Executor::Transaction(tx)),
        }
    }
}

impl Repositories for PgTxRepositories<'_> {
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
impl Datastore for PgDatastore {
    #[instrument(skip_all)]
    async fn with_transaction<T, F>(&self, ctx: &OpContext, f: F) -> Result<T>
    where
        T: Send,
        F: for<'r> FnOnce(&'r dyn Repositories) -> BoxFuture<'r, Result<T>> + Send,
    {
        let mut conn = ctx
            .run("acquire connection", async {
                self.pool.get().await.map_err(Error::from)
            })
            .await?;
        let tx = ctx
            .run("begin transaction", async {
                conn.transaction().await.map_err(Error::from)
            })
            .await?;
        debug!("Transaction begun");

        let outcome = {
            let repos = PgTxRepositories::new(&tx);
            match ctx.check("transaction") {
                Ok(()) => ctx.run("transaction", f(&repos)).await,
                Err(e) => Err(e),
            }
        };

        // A deadline that passed while `f` was finishing still aborts
        let outcome = outcome.and_then(|value| ctx.check("commit").map(|()| value));

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, original = %err, "Transaction rollback failed");
                } else {
                    debug!(error = %err, "Transaction rolled back");
                }
                Err(err)
            }
        }
    }
}
