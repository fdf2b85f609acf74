//! PostgreSQL Adapter
//!
//! Implements the repository ports and the unit of work over a
//! `deadpool-postgres` connection pool.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         PgDatastore                            │
//! │  root repositories (memoized)       with_transaction()         │
//! │  ┌──────────────────────────┐       ┌──────────────────────┐   │
//! │  │ Executor::Pool           │       │ Executor::Transaction │   │
//! │  │ (connection per call)    │       │ (one BEGIN..COMMIT)   │   │
//! │  └──────────────────────────┘       └──────────────────────┘   │
//! │            │                                  │                │
//! │            └──── PgBoxRepository / PgOrderRepository / ... ────┘
//! └───────────────────────────────────────────────────────────────┘
//! ```

mod box_repo;
mod datastore;
mod order_repo;
mod pickup_point_repo;

pub use box_repo::PgBoxRepository;
pub use datastore::{PgDatastore, PgTxRepositories};
pub use order_repo::PgOrderRepository;
pub use pickup_point_repo::PgPickupPointRepository;

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::error::{Error, Result};

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Time to wait for a pooled connection
    pub wait_timeout: Duration,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "pvz".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            wait_timeout: Duration::from_secs(30),
        }
    }
}

impl PgConfig {
    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened until the first query.
    pub fn create_pool(&self) -> Result<Pool> {
        if self.max_size == 0 {
            return Err(Error::Config("database pool size must be positive".to_string()));
        }

        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: self.max_size,
            timeouts: Timeouts {
                wait: Some(self.wait_timeout),
                ..Default::default()
            },
            ..Default::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| Error::Config(format!("Failed to create pool: {}", e)))
    }
}

// =============================================================================
// Statement Executor
// =============================================================================

type Params<'a> = [&'a (dyn ToSql + Sync)];

/// Where a repository sends its statements.
///
/// Root repositories borrow a pooled connection per statement; transactional
/// ones share the single connection the transaction was opened on.
#[derive(Clone)]
pub(crate) enum Executor<'t> {
    Pool(Pool),
    Transaction(&'t deadpool_postgres::Transaction<'t>),
}

impl Executor<'_> {
    pub(crate) async fn query(&self, sql: &str, params: &Params<'_>) -> Result<Vec<Row>> {
        match self {
            Executor::Pool(pool) => {
                let client = pool.get().await?;
                Ok(client.query(sql, params).await?)
            }
            Executor::Transaction(tx) => Ok(tx.query(sql, params).await?),
        }
    }

    pub(crate) async fn query_opt(&self, sql: &str, params: &Params<'_>) -> Result<Option<Row>> {
        match self {
            Executor::Pool(pool) => {
                let client = pool.get().await?;
                Ok(client.query_opt(sql, params).await?)
            }
            Executor::Transaction(tx) => Ok(tx.query_opt(sql, params).await?),
        }
    }

    pub(crate) async fn query_one(&self, sql: &str, params: &Params<'_>) -> Result<Row> {
        match self {
            Executor::Pool(pool) => {
                let client = pool.get().await?;
                Ok(client.query_one(sql, params).await?)
            }
            Executor::Transaction(tx) => Ok(tx.query_one(sql, params).await?),
        }
    }

    /// Execute a statement, returning the number of affected rows
    pub(crate) async fn execute(&self, sql: &str, params: &Params<'_>) -> Result<u64> {
        match self {
            Executor::Pool(pool) => {
                let client = pool.get().await?;
                Ok(client.execute(sql, params).await?)
            }
            Executor::Transaction(tx) => Ok(tx.execute(sql, params).await?),
        }
    }

    /// Single-row `COUNT(..)` query
    pub(crate) async fn count(&self, sql: &str) -> Result<i64> {
        let row = self.query_one(sql, &[]).await?;
        Ok(row.try_get(0)?)
    }
}
