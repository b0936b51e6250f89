//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Store       │   │    Product      │   │  StockMovement  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  seq / id       │       │
//! │  │  tenant_id      │   │  sku (business) │   │  store/product  │       │
//! │  │  allow_negative │   │  unit, category │   │  type, quantity │       │
//! │  └─────────────────┘   └─────────────────┘   │  delta (signed) │       │
//! │                                              └────────┬────────┘       │
//! │                                                       │ Σ delta        │
//! │  ┌─────────────────┐                         ┌────────▼────────┐       │
//! │  │    AuditLog     │                         │  CurrentStock   │       │
//! │  │  ─────────────  │                         │  ─────────────  │       │
//! │  │  action         │                         │  (store,product)│       │
//! │  │  resource       │                         │  quantity       │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `StockMovement` and `AuditLog` are immutable once written. `CurrentStock`
//! is a derived view and never authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

// =============================================================================
// Request Context
// =============================================================================

/// Authenticated, store-scoped context handed to the engine by the
/// authentication collaborator. The engine trusts it and performs no
/// authentication of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Tenant every lookup is scoped to.
    pub tenant_id: String,

    /// Who is acting (API key owner, user id). Recorded on movements and audit entries.
    pub actor: Option<String>,

    /// Stores this caller may touch. `None` means every store of the tenant.
    pub allowed_stores: Option<Vec<String>>,
}

impl RequestContext {
    /// Creates a context with tenant-wide access and no actor.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        RequestContext {
            tenant_id: tenant_id.into(),
            actor: None,
            allowed_stores: None,
        }
    }

    /// Sets the acting principal.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Restricts the context to the given stores.
    pub fn with_allowed_stores<I, S>(mut self, stores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_stores = Some(stores.into_iter().map(Into::into).collect());
        self
    }

    /// Checks whether the caller may touch `store_id`.
    pub fn can_access_store(&self, store_id: &str) -> bool {
        match &self.allowed_stores {
            None => true,
            Some(stores) => stores.iter().any(|s| s == store_id),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// A physical or logical location holding stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Store {
    /// Unique identifier (UUID v4). Immutable.
    pub id: String,

    /// Tenant this store belongs to.
    pub tenant_id: String,

    /// Display name.
    pub name: String,

    /// Free-form location label (e.g. "Downtown").
    pub location: Option<String>,

    /// Street address.
    pub address: Option<String>,

    /// Per-store override of the global negative-stock policy.
    /// `None` falls back to configuration.
    pub allow_negative_stock: Option<bool>,

    /// Soft-delete flag.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStore {
    pub name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub allow_negative_stock: Option<bool>,
}

/// Partial update of store metadata. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    /// `Some(None)` clears the override.
    pub allow_negative_stock: Option<Option<bool>>,
}

// =============================================================================
// Product
// =============================================================================

/// A product tracked in stock. The id is immutable; attributes are managed
/// by the product-management collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this product belongs to.
    pub tenant_id: String,

    /// Stock Keeping Unit - business identifier, unique per tenant.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Unit of measure ("each", "kg", "case").
    pub unit: String,

    /// Optional category label.
    pub category: Option<String>,

    /// Quantity at or below which a low-stock alert is raised.
    pub low_stock_threshold: Option<i64>,

    /// Soft-delete flag.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` is at or below this product's alert threshold.
    pub fn is_low(&self, quantity: i64) -> bool {
        self.low_stock_threshold
            .map(|threshold| quantity <= threshold)
            .unwrap_or(false)
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub category: Option<String>,
    pub low_stock_threshold: Option<i64>,
}

impl NewProduct {
    /// Creates a product input with unit "each".
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        NewProduct {
            sku: sku.into(),
            name: name.into(),
            unit: "each".to_string(),
            category: None,
            low_stock_threshold: None,
        }
    }
}

/// Partial update of product attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
    /// `Some(None)` clears the threshold.
    pub low_stock_threshold: Option<Option<i64>>,
}

// =============================================================================
// Movement Type
// =============================================================================

/// What a stock movement does to on-hand quantity.
///
/// | Type       | Sign | Meaning                                   |
/// |------------|------|-------------------------------------------|
/// | `StockIn`  |  +   | Receiving inventory                       |
/// | `Sale`     |  −   | Sold to a customer                        |
/// | `Removal`  |  −   | Damage, loss, shrinkage (audited)         |
/// | `Return`   |  +   | Customer return back into sellable stock  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    StockIn,
    Sale,
    Removal,
    Return,
}

impl MovementType {
    /// All movement types, in declaration order.
    pub const ALL: [MovementType; 4] = [
        MovementType::StockIn,
        MovementType::Sale,
        MovementType::Removal,
        MovementType::Return,
    ];

    /// +1 for increasing movements, -1 for decreasing ones.
    #[inline]
    pub const fn sign(&self) -> i64 {
        match self {
            MovementType::StockIn | MovementType::Return => 1,
            MovementType::Sale | MovementType::Removal => -1,
        }
    }

    /// Whether this movement lowers on-hand quantity.
    #[inline]
    pub const fn is_decrease(&self) -> bool {
        self.sign() < 0
    }

    /// Wire/database name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::StockIn => "stock_in",
            MovementType::Sale => "sale",
            MovementType::Removal => "removal",
            MovementType::Return => "return",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "movement_type".to_string(),
                allowed: MovementType::ALL.iter().map(|t| t.to_string()).collect(),
            })
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// One immutable entry of the movement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    /// Ledger position. Strictly increasing in commit order.
    pub seq: i64,

    /// Unique identifier (UUID v4).
    pub id: String,

    pub tenant_id: String,
    pub store_id: String,
    pub product_id: String,
    pub movement_type: MovementType,

    /// Always positive; the sign lives in `delta`.
    pub quantity: i64,

    /// Signed effect on on-hand quantity.
    pub delta: i64,

    /// Unit price for sales (valued reports). `None` for unpriced movements.
    pub unit_price_cents: Option<i64>,

    /// Invoice, purchase order or receipt number.
    pub reference: Option<String>,

    pub notes: Option<String>,

    /// Who recorded the movement.
    pub actor: Option<String>,

    /// When the movement happened (business time).
    pub occurred_at: DateTime<Utc>,

    /// When the ledger recorded it.
    pub recorded_at: DateTime<Utc>,
}

/// Input for appending a movement to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovement {
    pub store_id: String,
    pub product_id: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    /// Business time. `None` means "now".
    pub occurred_at: Option<DateTime<Utc>>,
    pub unit_price_cents: Option<i64>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl NewMovement {
    /// Creates an unpriced movement happening now.
    pub fn new(
        store_id: impl Into<String>,
        product_id: impl Into<String>,
        movement_type: MovementType,
        quantity: i64,
    ) -> Self {
        NewMovement {
            store_id: store_id.into(),
            product_id: product_id.into(),
            movement_type,
            quantity,
            occurred_at: None,
            unit_price_cents: None,
            reference: None,
            notes: None,
        }
    }

    /// Sets the business timestamp.
    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Sets the unit price in cents.
    pub fn priced(mut self, unit_price_cents: i64) -> Self {
        self.unit_price_cents = Some(unit_price_cents);
        self
    }

    /// Sets the external reference.
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Sets free-form notes.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// The (store, product) key this movement affects.
    pub fn key(&self) -> StockKey {
        StockKey::new(&self.store_id, &self.product_id)
    }
}

/// Filters for listing the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<String>,
    pub movement_type: Option<MovementType>,
    pub range: Option<TimeRange>,
    pub offset: u32,
    pub limit: u32,
}

impl Default for MovementFilter {
    fn default() -> Self {
        MovementFilter {
            product_id: None,
            movement_type: None,
            range: None,
            offset: 0,
            limit: 100,
        }
    }
}

impl MovementFilter {
    /// Restricts the listing to one product.
    pub fn for_product(product_id: impl Into<String>) -> Self {
        MovementFilter {
            product_id: Some(product_id.into()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Current Stock
// =============================================================================

/// Key of the derived view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub store_id: String,
    pub product_id: String,
}

impl StockKey {
    pub fn new(store_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        StockKey {
            store_id: store_id.into(),
            product_id: product_id.into(),
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_id, self.product_id)
    }
}

/// Materialised on-hand quantity for one (store, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CurrentStock {
    pub store_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Number of ledger entries folded into `quantity`. Zero for an explicit
    /// zero-initialisation record.
    pub movement_count: i64,
    /// `seq` of the last folded movement.
    pub last_seq: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl CurrentStock {
    pub fn key(&self) -> StockKey {
        StockKey::new(&self.store_id, &self.product_id)
    }
}

/// Result of a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub movement: StockMovement,
    /// On-hand quantity after the movement.
    pub current_stock: i64,
    /// Whether the product is now at or below its alert threshold.
    pub low_stock: bool,
}

/// Raised when a write leaves a product at or below its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LowStockAlert {
    pub store_id: String,
    pub product_id: String,
    pub sku: String,
    pub quantity: i64,
    pub threshold: i64,
    pub raised_at: DateTime<Utc>,
}

// =============================================================================
// Time Range
// =============================================================================

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range, rejecting empty or inverted windows.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::invalid_format(
                "time_range",
                "start must be before end",
            ));
        }
        Ok(TimeRange { start, end })
    }

    /// Whether `ts` falls inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

// =============================================================================
// Audit Log
// =============================================================================

/// Kind of audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Deactivate,
    /// Manual stock removal (damage, loss).
    Removal,
    /// Derived view rebuilt from the ledger after a mismatch.
    Repair,
}

impl AuditAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Deactivate => "deactivate",
            AuditAction::Removal => "removal",
            AuditAction::Repair => "repair",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of an administrative or sensitive action, kept apart
/// from the movement ledger for compliance review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditLog {
    pub id: String,
    pub tenant_id: String,
    pub actor: Option<String>,
    pub action: AuditAction,
    /// "store", "product", "stock_movement", "current_stock".
    pub resource_type: String,
    pub resource_id: String,
    /// JSON document describing the change.
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters for reading the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFilter {
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: Option<AuditAction>,
    pub actor: Option<String>,
    pub range: Option<TimeRange>,
    pub offset: u32,
    pub limit: u32,
}

impl Default for AuditFilter {
    fn default() -> Self {
        AuditFilter {
            resource_type: None,
            resource_id: None,
            action: None,
            actor: None,
            range: None,
            offset: 0,
            limit: 100,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_movement_type_signs() {
        assert_eq!(MovementType::StockIn.sign(), 1);
        assert_eq!(MovementType::Return.sign(), 1);
        assert_eq!(MovementType::Sale.sign(), -1);
        assert_eq!(MovementType::Removal.sign(), -1);
        assert!(MovementType::Removal.is_decrease());
    }

    #[test]
    fn test_movement_type_parse() {
        assert_eq!("stock_in".parse::<MovementType>().unwrap(), MovementType::StockIn);
        assert_eq!(" SALE ".parse::<MovementType>().unwrap(), MovementType::Sale);
        assert!(matches!(
            "transfer".parse::<MovementType>(),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_movement_type_serde_matches_as_str() {
        for t in MovementType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_time_range_is_half_open() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let range = TimeRange::new(start, end).unwrap();

        assert!(range.contains(start));
        assert!(!range.contains(end));
        assert!(TimeRange::new(end, start).is_err());
        assert!(TimeRange::new(start, start).is_err());
    }

    #[test]
    fn test_request_context_store_scope() {
        let ctx = RequestContext::new("t1");
        assert!(ctx.can_access_store("anything"));

        let scoped = ctx.with_allowed_stores(["s1"]);
        assert!(scoped.can_access_store("s1"));
        assert!(!scoped.can_access_store("s2"));
    }

    #[test]
    fn test_product_low_threshold() {
        let now = Utc::now();
        let mut product = Product {
            id: "p".into(),
            tenant_id: "t".into(),
            sku: "SKU".into(),
            name: "Thing".into(),
            unit: "each".into(),
            category: None,
            low_stock_threshold: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(!product.is_low(0));

        product.low_stock_threshold = Some(5);
        assert!(product.is_low(5));
        assert!(!product.is_low(6));
    }
}
