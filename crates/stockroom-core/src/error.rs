//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockroom-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  stockroom-engine errors                                               │
//! │  └── InventoryError   - What collaborators see (with ErrorCode)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → InventoryError → Collaborator     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A sale or removal would take on-hand quantity below zero while the
    /// effective policy forbids negative stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Append sale (qty: 100)
    ///      │
    ///      ▼
    /// Current stock: 60
    ///      │
    ///      ▼
    /// InsufficientStock { available: 60, requested: 100 }
    ///      │
    ///      ▼
    /// Transaction rolled back, ledger unchanged
    /// ```
    #[error("Insufficient stock for product {product_id} at store {store_id}: available {available}, requested {requested}")]
    InsufficientStock {
        store_id: String,
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// The derived view disagrees with the ledger.
    #[error("Stock view for product {product_id} at store {store_id} is {recorded} but ledger sums to {expected}")]
    Inconsistent {
        store_id: String,
        product_id: String,
        recorded: i64,
        expected: i64,
    },

    /// Adding a delta overflowed the quantity type.
    #[error("Quantity overflow for product {product_id} at store {store_id}")]
    QuantityOverflow { store_id: String, product_id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Always surfaced to the caller and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, bad time range).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// The referenced store or product exists but is deactivated.
    #[error("{entity} {id} is inactive")]
    Inactive { entity: String, id: String },

    /// A write references a store or product that does not exist (or is
    /// outside the caller's scope).
    #[error("{entity} {id} does not exist")]
    UnknownReference { entity: String, id: String },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidFormat`].
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            store_id: "S1".to_string(),
            product_id: "P1".to_string(),
            available: 60,
            requested: 100,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product P1 at store S1: available 60, requested 100"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "sku".to_string(),
        };
        assert_eq!(err.to_string(), "sku is required");

        let err = ValidationError::Inactive {
            entity: "Store".to_string(),
            id: "S1".to_string(),
        };
        assert_eq!(err.to_string(), "Store S1 is inactive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::invalid_format("range", "empty").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
