//! # Validation Module
//!
//! Input validation for everything that crosses into the engine.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Collaborator (HTTP handler)                                  │
//! │  └── Deserialization, authentication                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: stockroom-engine                                             │
//! │  ├── THIS MODULE: shape and range checks                               │
//! │  └── Existence / active checks against the database                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  ├── CHECK (quantity > 0), CHECK (movement_type IN ...)                │
//! │  └── UNIQUE (tenant_id, sku), foreign keys                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::error::ValidationError;
use crate::types::{NewMovement, NewProduct, NewStore, TimeRange};
use crate::{MAX_CLOCK_SKEW_SECS, MAX_MOVEMENT_QUANTITY, MAX_PAGE_SIZE, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn required(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

fn optional(field: &str, value: Option<&str>, max: usize) -> ValidationResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

/// Validates an identifier passed by a caller.
///
/// Identifiers are opaque here: an id that is well-formed but unknown is a
/// `NotFound`, decided by the engine, not a validation failure.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    required(field, id, 64)
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - 1 to 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_sku;
///
/// assert!(validate_sku("COFFEE-1KG").is_ok());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    required("sku", sku, 50)?;

    if !sku
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid_format(
            "sku",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validates a store or product display name (1 to 200 characters).
pub fn validate_name(name: &str) -> ValidationResult<()> {
    required("name", name, 200)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a movement quantity.
///
/// ## Rules
/// - Must be positive (> 0). The sign comes from the movement type.
/// - Must not exceed `MAX_MOVEMENT_QUANTITY`
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_MOVEMENT_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_MOVEMENT_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price in cents. Zero is allowed (giveaways).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "unit_price_cents".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a low-stock threshold (non-negative).
pub fn validate_threshold(threshold: i64) -> ValidationResult<()> {
    if threshold < 0 {
        return Err(ValidationError::OutOfRange {
            field: "low_stock_threshold".to_string(),
            min: 0,
            max: MAX_MOVEMENT_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a page size for ledger and audit listings.
pub fn validate_limit(limit: u32) -> ValidationResult<()> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ValidationError::OutOfRange {
            field: "limit".to_string(),
            min: 1,
            max: MAX_PAGE_SIZE as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Time Validators
// =============================================================================

/// Rejects business timestamps too far in the future.
///
/// Terminals with slightly fast clocks are tolerated up to
/// `MAX_CLOCK_SKEW_SECS`.
pub fn validate_occurred_at(occurred_at: DateTime<Utc>, now: DateTime<Utc>) -> ValidationResult<()> {
    if occurred_at > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
        return Err(ValidationError::invalid_format(
            "occurred_at",
            format!("must not be more than {MAX_CLOCK_SKEW_SECS} seconds in the future"),
        ));
    }

    Ok(())
}

/// Validates a report window.
pub fn validate_range(range: &TimeRange) -> ValidationResult<()> {
    if range.start >= range.end {
        return Err(ValidationError::invalid_format(
            "time_range",
            "start must be before end",
        ));
    }

    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates everything about a movement that can be checked without I/O.
pub fn validate_new_movement(movement: &NewMovement, now: DateTime<Utc>) -> ValidationResult<()> {
    validate_id("store_id", &movement.store_id)?;
    validate_id("product_id", &movement.product_id)?;
    validate_quantity(movement.quantity)?;

    if let Some(price) = movement.unit_price_cents {
        validate_price_cents(price)?;
    }
    if let Some(at) = movement.occurred_at {
        validate_occurred_at(at, now)?;
    }

    optional("reference", movement.reference.as_deref(), 100)?;
    optional("notes", movement.notes.as_deref(), 500)?;

    Ok(())
}

pub fn validate_new_store(store: &NewStore) -> ValidationResult<()> {
    validate_name(&store.name)?;
    optional("location", store.location.as_deref(), 200)?;
    optional("address", store.address.as_deref(), 500)
}

pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_sku(&product.sku)?;
    validate_name(&product.name)?;
    required("unit", &product.unit, 20)?;
    optional("category", product.category.as_deref(), 100)?;

    if let Some(threshold) = product.low_stock_threshold {
        validate_threshold(threshold)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MovementType;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("COFFEE-1KG").is_ok());
        assert!(validate_sku("tea_green").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_MOVEMENT_QUANTITY).is_ok());

        assert!(matches!(
            validate_quantity(0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_quantity(-5).is_err());
        assert!(validate_quantity(MAX_MOVEMENT_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(MAX_UNIT_PRICE_CENTS).is_ok());

        assert!(validate_price_cents(-1).is_err());
        assert!(validate_price_cents(MAX_UNIT_PRICE_CENTS + 1).is_err());
        assert!(validate_price_cents(i64::MAX / 2 + 1).is_err());

        // The largest accepted line total fits an i64 with room to sum.
        let line = MAX_MOVEMENT_QUANTITY.checked_mul(MAX_UNIT_PRICE_CENTS);
        assert!(line.is_some_and(|cents| cents < 1 << 53));
    }

    #[test]
    fn test_validate_occurred_at() {
        let now = Utc::now();
        assert!(validate_occurred_at(now - Duration::days(30), now).is_ok());
        assert!(validate_occurred_at(now + Duration::seconds(60), now).is_ok());
        assert!(validate_occurred_at(now + Duration::hours(1), now).is_err());
    }

    #[test]
    fn test_validate_limit() {
        assert!(validate_limit(1).is_ok());
        assert!(validate_limit(MAX_PAGE_SIZE).is_ok());
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(MAX_PAGE_SIZE + 1).is_err());
    }

    #[test]
    fn test_validate_new_movement() {
        let now = Utc::now();
        let ok = NewMovement::new("s", "p", MovementType::Sale, 3).priced(199);
        assert!(validate_new_movement(&ok, now).is_ok());

        let bad_price = NewMovement::new("s", "p", MovementType::Sale, 3).priced(-1);
        assert!(validate_new_movement(&bad_price, now).is_err());

        let no_store = NewMovement::new("", "p", MovementType::StockIn, 3);
        assert_eq!(
            validate_new_movement(&no_store, now),
            Err(ValidationError::Required {
                field: "store_id".to_string()
            })
        );
    }

    #[test]
    fn test_validate_new_product() {
        let mut product = NewProduct::new("BEANS-1", "Coffee beans");
        assert!(validate_new_product(&product).is_ok());

        product.low_stock_threshold = Some(-1);
        assert!(validate_new_product(&product).is_err());
    }
}
