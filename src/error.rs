//! Error types for the pickup point service

use thiserror::Error;

use crate::cache::CacheError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of every error the service can surface.
///
/// Callers branch on the kind rather than on individual variants; the
/// transport layer maps kinds to its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Cache miss, expired cache entry, or a store read/update touching zero rows
    NotFound,
    /// Unique-constraint violation on insert
    AlreadyExists,
    /// Empty or malformed cache key
    InvalidKey,
    /// A business rule rejected the request
    FailedPrecondition,
    /// The caller cancelled the operation or its deadline expired
    Cancelled,
    /// Any other store/transaction failure
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::AlreadyExists => write!(f, "already_exists"),
            ErrorKind::InvalidKey => write!(f, "invalid_key"),
            ErrorKind::FailedPrecondition => write!(f, "failed_precondition"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Errors that can occur in the pickup point service
#[derive(Error, Debug)]
pub enum Error {
    /// Cache lookup or write failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// PostgreSQL driver error
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool error
    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Injected or backend-reported transaction failure
    #[error("Transaction {stage} failed: {reason}")]
    Transaction { stage: &'static str, reason: String },

    // =========================================================================
    // Entity Errors
    // =========================================================================
    /// Box not found
    #[error("Box not found: {0}")]
    BoxNotFound(i64),

    /// Box with the same unique attributes already exists
    #[error("Box already exists: {0}")]
    BoxAlreadyExists(String),

    /// Order not found
    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    /// Order with the same ID already exists
    #[error("Order already exists: {0}")]
    OrderAlreadyExists(i64),

    /// Pickup point not found
    #[error("Pickup point not found: {0}")]
    PickupPointNotFound(i64),

    /// Pickup point with the same name, address and contact already exists
    #[error("Pickup point already exists: {0}")]
    PickupPointAlreadyExists(String),

    // =========================================================================
    // Business Rule Errors
    // =========================================================================
    /// Orders in one issuance batch belong to different clients
    #[error("Orders belong to multiple clients: order {order_id} is not owned by client {client_id}")]
    MultipleClients { order_id: i64, client_id: i64 },

    /// Order storage period is over
    #[error("Order {order_id} expired at {expires_at}")]
    OrderExpired {
        order_id: i64,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    /// Order was already issued or returned
    #[error("Order {0} is not available for issuance")]
    OrderNotIssuable(i64),

    /// Order weight exceeds the checked capacity of the box
    #[error("Order weight {order_weight} exceeds box {box_id} capacity {capacity}")]
    BoxCapacityExceeded {
        box_id: i64,
        order_weight: f64,
        capacity: f64,
    },

    /// Request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Operation cancelled by the caller
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Operation deadline expired
    #[error("Deadline exceeded after {elapsed_ms}ms: {context}")]
    DeadlineExceeded { elapsed_ms: u64, context: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error into the service-wide taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Cache(CacheError::NotFound) => ErrorKind::NotFound,
            Error::Cache(CacheError::InvalidKey) => ErrorKind::InvalidKey,
            Error::BoxNotFound(_) | Error::OrderNotFound(_) | Error::PickupPointNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::BoxAlreadyExists(_)
            | Error::OrderAlreadyExists(_)
            | Error::PickupPointAlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::MultipleClients { .. }
            | Error::OrderExpired { .. }
            | Error::OrderNotIssuable(_)
            | Error::BoxCapacityExceeded { .. }
            | Error::InvalidRequest(_) => ErrorKind::FailedPrecondition,
            Error::Cancelled(_) | Error::DeadlineExceeded { .. } => ErrorKind::Cancelled,
            Error::Postgres(e) if is_unique_violation(e) => ErrorKind::AlreadyExists,
            _ => ErrorKind::Internal,
        }
    }

    /// Returns true if this error means "nothing there".
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// SQLSTATE 23505: unique_violation
pub(crate) fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION)
}
