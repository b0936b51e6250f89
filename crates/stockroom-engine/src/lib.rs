//! # stockroom-engine: Inventory Engine for Stockroom
//!
//! Records stock movements for many tenants and stores, keeps a derived
//! current-stock view consistent with the ledger, and serves stock reads and
//! reports through a cache that never returns a value older than the last
//! committed write.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Collaborator (HTTP, CLI, jobs)                     │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                stockroom-engine (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   inventory    append, current_stock, bulk, ledger listing     │   │
//! │  │   reconcile    verify / recompute from the ledger              │   │
//! │  │   reporting    stock levels, sales                             │   │
//! │  │   catalog      stores, products, audit log                     │   │
//! │  │   events       StockUpdated / LowStock fan-out to watchers     │   │
//! │  │                                                                 │   │
//! │  │   locks ── per-key serialisation + generations                  │   │
//! │  │   cache ── CacheLayer over memory / Redis backends              │   │
//! │  │   retry ── exponential backoff for transient store errors       │   │
//! │  └───────────────────────────┬─────────────────────────────────────┘   │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                 stockroom-db (SQLite)  ◄── stockroom-core (rules)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_core::{MovementType, NewMovement, RequestContext};
//! use stockroom_engine::{EngineConfig, InventoryEngine};
//!
//! let engine = InventoryEngine::new(EngineConfig::load(None)?).await?;
//! let ctx = RequestContext::new(tenant_id).with_actor("clerk-7");
//!
//! engine
//!     .append(&ctx, NewMovement::new(store_id, product_id, MovementType::StockIn, 100))
//!     .await?;
//! let on_hand = engine.current_stock(&ctx, store_id, product_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod inventory;
pub mod locks;
pub mod reconcile;
pub mod reporting;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{CacheBackend, CacheError, CacheLayer, CacheStats, MemoryCache, RedisCache};
pub use config::{CacheMode, ConfigError, EngineConfig};
pub use error::{ErrorCode, InventoryError, InventoryResult};
pub use events::{StockEvent, StockWatch};
pub use inventory::InventoryEngine;
pub use reconcile::VerifyOutcome;
pub use retry::RetryPolicy;
