//! # Inventory Error Type
//!
//! The error type collaborators see from every engine operation.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    What Happens To Each Failure                         │
//! │                                                                         │
//! │  ValidationError      → surfaced, never retried                        │
//! │  NotFound             → surfaced                                       │
//! │  InsufficientStock    → surfaced, transaction rolled back              │
//! │  Consistency          → logged + repaired from the ledger;             │
//! │                         surfaced only if the repair fails              │
//! │  TransientStore       → retried with backoff, then Unavailable         │
//! │  Timeout              → surfaced, transaction rolled back              │
//! │  Cache failure        → logged, NEVER surfaced                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each variant maps to a machine-readable [`ErrorCode`] that an HTTP
//! collaborator can turn into a status code:
//! ```json
//! { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for ..." }
//! ```

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use stockroom_core::{CoreError, ValidationError};
use stockroom_db::DbError;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Resource not found (404)
    NotFound,

    /// Write would drive stock negative (409)
    InsufficientStock,

    /// View/ledger mismatch that could not be repaired (500)
    ConsistencyError,

    /// Store busy, retry may succeed (503)
    TransientStoreError,

    /// Retries exhausted (503)
    ServiceUnavailable,

    /// Write did not finish in time (504)
    Timeout,

    /// Internal error (500)
    Internal,
}

/// Errors returned by the inventory engine.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Insufficient stock for product {product_id} at store {store_id}: available {available}, requested {requested}")]
    InsufficientStock {
        store_id: String,
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Only surfaced when the automatic repair itself failed.
    #[error("Stock for product {product_id} at store {store_id} is inconsistent with the ledger: {detail}")]
    Consistency {
        store_id: String,
        product_id: String,
        detail: String,
    },

    /// A single transient failure. Normally absorbed by retries.
    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Store unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("Write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl InventoryError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        InventoryError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            InventoryError::Validation(_) => ErrorCode::ValidationError,
            InventoryError::NotFound { .. } => ErrorCode::NotFound,
            InventoryError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            InventoryError::Consistency { .. } => ErrorCode::ConsistencyError,
            InventoryError::TransientStore(_) => ErrorCode::TransientStoreError,
            InventoryError::Unavailable { .. } => ErrorCode::ServiceUnavailable,
            InventoryError::Timeout(_) => ErrorCode::Timeout,
            InventoryError::Config(_) | InventoryError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the engine's retry loop should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::TransientStore(_))
    }
}

/// Converts database errors.
///
/// ## Error Mapping
/// ```text
/// Busy / PoolExhausted / ConnectionFailed → TransientStore (retried)
/// NotFound                                → NotFound
/// UniqueViolation                         → Validation
/// CHECK / FK violation                    → Validation
/// Everything else                         → Internal (logged)
/// ```
impl From<DbError> for InventoryError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            return InventoryError::TransientStore(err.to_string());
        }

        match err {
            DbError::NotFound { entity, id } => InventoryError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => {
                InventoryError::Validation(ValidationError::invalid_format(
                    field,
                    format!("'{value}' already exists"),
                ))
            }
            DbError::CheckViolation(message) => {
                InventoryError::Validation(ValidationError::invalid_format("input", message))
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                InventoryError::Validation(ValidationError::invalid_format(
                    "reference",
                    "invalid reference",
                ))
            }
            other => {
                tracing::error!(error = %other, "Database operation failed");
                InventoryError::Internal(other.to_string())
            }
        }
    }
}

/// Converts core errors.
impl From<CoreError> for InventoryError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                store_id,
                product_id,
                available,
                requested,
            } => InventoryError::InsufficientStock {
                store_id,
                product_id,
                available,
                requested,
            },
            CoreError::Inconsistent {
                store_id,
                product_id,
                recorded,
                expected,
            } => InventoryError::Consistency {
                store_id,
                product_id,
                detail: format!("view {recorded}, ledger {expected}"),
            },
            CoreError::QuantityOverflow {
                store_id,
                product_id,
            } => InventoryError::Validation(ValidationError::invalid_format(
                "quantity",
                format!("overflows stock of product {product_id} at store {store_id}"),
            )),
            CoreError::Validation(v) => InventoryError::Validation(v),
        }
    }
}

impl From<sqlx::Error> for InventoryError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

/// Result type for engine operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_db_errors_are_retryable() {
        let err: InventoryError = DbError::Busy("database is locked".into()).into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), ErrorCode::TransientStoreError);

        let err: InventoryError = DbError::not_found("Store", "s1").into();
        assert!(!err.is_retryable());
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_core_errors_map() {
        let err: InventoryError = CoreError::InsufficientStock {
            store_id: "S1".into(),
            product_id: "P1".into(),
            available: 60,
            requested: 100,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InsufficientStock).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_STOCK\"");
        let json = serde_json::to_string(&ErrorCode::ServiceUnavailable).unwrap();
        assert_eq!(json, "\"SERVICE_UNAVAILABLE\"");
    }
}
