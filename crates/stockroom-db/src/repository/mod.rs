//! # Repository Module
//!
//! Database repository implementations for Stockroom.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  stockroom-engine                                                      │
//! │       │                                                                 │
//! │       │  db.stock().get(store, product)          pool-scoped reads      │
//! │       │  MovementRepository::append(&mut tx, ..) tx-scoped writes       │
//! │       ▼                                                                 │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐      │
//! │  │  Store   │ │ Product  │ │ Movement │ │  Stock   │ │  Audit   │      │
//! │  └──────────┘ └──────────┘ └──────────┘ └──────────┘ └──────────┘      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods that must share a transaction with other writes are associated
//! functions taking `&mut SqliteConnection`; everything else goes through
//! the pool held by the repository.
//!
//! ## Available Repositories
//!
//! - [`StoreRepository`](store::StoreRepository) - Stores per tenant
//! - [`ProductRepository`](product::ProductRepository) - Product catalogue
//! - [`MovementRepository`](movement::MovementRepository) - The ledger
//! - [`StockRepository`](stock::StockRepository) - The current-stock view
//! - [`AuditRepository`](audit::AuditRepository) - Audit trail

pub mod audit;
pub mod movement;
pub mod product;
pub mod stock;
pub mod store;
