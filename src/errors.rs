use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

/// Unified error type for the inventory core.
///
/// Business-rule violations (`NotAssigned`, `InsufficientStock`, ...) are
/// expected outcomes of an operation and are returned to callers as typed
/// values; only `DatabaseError` / `InternalError` / `Other` represent
/// infrastructure faults that roll the surrounding transaction back.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Product {product_id} is not assigned to location {location_id}")]
    NotAssigned {
        product_id: Uuid,
        location_id: Uuid,
    },

    #[error("Product {product_id} is already assigned to location {location_id}")]
    AlreadyAssigned {
        product_id: Uuid,
        location_id: Uuid,
    },

    #[error("Cannot unassign while {quantity} units remain in stock")]
    NonZeroStock { quantity: i32 },

    #[error("Invalid quantity: {0} (must be greater than zero)")]
    InvalidQuantity(i32),

    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("A reason is required for manual stock adjustments")]
    MissingReason,

    #[error("Import validation failed: {}", .0.join("; "))]
    ImportValidation(Vec<String>),

    #[error("Concurrent modification of stock for product {product_id} at location {location_id}")]
    ConcurrentModification {
        product_id: Uuid,
        location_id: Uuid,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Whether the error is an expected business-rule outcome rather than an
    /// infrastructure fault. Callers use this to decide between surfacing the
    /// error to the operator and alerting.
    pub fn is_business_rule(&self) -> bool {
        !matches!(
            self,
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) | Self::Other(_)
        )
    }
}

/// Unwraps sea-orm's transaction error wrapper back into a `ServiceError`.
pub fn from_transaction_error(err: sea_orm::TransactionError<ServiceError>) -> ServiceError {
    match err {
        sea_orm::TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        sea_orm::TransactionError::Transaction(service_err) => service_err,
    }
}
