//! # stockroom-core: Pure Inventory Logic for Stockroom
//!
//! This crate holds the domain model and every rule that does not need I/O:
//! the sign convention for stock movements, ledger replay, the negative-stock
//! policy, input validation, the cache key scheme and report folding.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Collaborators (HTTP, auth, rate limiting)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ RequestContext                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    stockroom-engine                             │   │
//! │  │    append, current_stock, bulk_current_stock, reports           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockroom-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  ledger   │  │cache_keys │  │ validation│  │   │
//! │  │   │ Movement  │  │  deltas   │  │  stock:*  │  │   rules   │  │   │
//! │  │   │  Store    │  │  replay   │  │ report:*  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockroom-db (Database Layer)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Store, Product, StockMovement, AuditLog, ...)
//! - [`ledger`] - Sign convention, replay and the negative-stock policy
//! - [`cache_keys`] - Cache key scheme shared by readers and writers
//! - [`report`] - Folding ledger rows into report shapes
//! - [`money`] - Integer-cent money for valued sales reports
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::ledger::{signed_delta, StockPolicy};
//! use stockroom_core::MovementType;
//!
//! let policy = StockPolicy::default(); // rejects negative stock
//!
//! let after_delivery = policy.apply("s1", "p1", 0, signed_delta(MovementType::StockIn, 100)).unwrap();
//! assert_eq!(after_delivery, 100);
//!
//! let oversell = policy.apply("s1", "p1", after_delivery, signed_delta(MovementType::Sale, 150));
//! assert!(oversell.is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache_keys;
pub mod error;
pub mod ledger;
pub mod money;
pub mod report;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::StockPolicy;
pub use money::Money;
pub use report::{SalesLine, SalesReport, StockLevel, StockLevelsReport};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tenant ID for single-tenant deployments and tooling.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum quantity carried by a single movement.
///
/// ## Business Reason
/// Catches typos (an extra zero or five) before they land in an append-only
/// ledger where the only fix is a compensating movement.
pub const MAX_MOVEMENT_QUANTITY: i64 = 1_000_000;

/// Maximum unit price of a priced movement, in cents.
///
/// One line's revenue (`MAX_MOVEMENT_QUANTITY * MAX_UNIT_PRICE_CENTS`)
/// stays below 2^53, so SQL aggregates over sales never leave the integer
/// range.
pub const MAX_UNIT_PRICE_CENTS: i64 = 1_000_000_000;

/// Maximum page size for ledger and audit listings.
pub const MAX_PAGE_SIZE: u32 = 1_000;

/// How far in the future a movement timestamp may be (clock skew between
/// terminals and the server).
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;
