//! # Movement Repository
//!
//! The append-only movement ledger.
//!
//! ## Ledger Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock_movements                                                        │
//! │                                                                         │
//! │  seq │ store │ product │ type     │ qty │ delta │ occurred_at           │
//! │  ────┼───────┼─────────┼──────────┼─────┼───────┼────────────           │
//! │   1  │  S1   │   P1    │ stock_in │ 100 │ +100  │ 09:00                 │
//! │   2  │  S1   │   P1    │ sale     │  30 │  -30  │ 11:15                 │
//! │   3  │  S1   │   P1    │ removal  │  10 │  -10  │ 16:40                 │
//! │                                                                         │
//! │  • INSERT only. UPDATE/DELETE are rejected by triggers.                │
//! │  • seq is assigned at insert and reflects commit order.                │
//! │  • Σ delta per (store, product) is the authoritative on-hand quantity. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`MovementRepository::append`] takes a connection rather than the pool so
//! the engine can run it inside the same transaction as the view update.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use stockroom_core::ledger::signed_delta;
use stockroom_core::{MovementFilter, NewMovement, StockLevel, StockMovement, TimeRange};

const MOVEMENT_COLUMNS: &str = "seq, id, tenant_id, store_id, product_id, movement_type, quantity, \
                                delta, unit_price_cents, reference, notes, actor, occurred_at, \
                                recorded_at";

/// Σ delta, entry count and last seq for one (store, product).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct LedgerSummary {
    pub quantity: i64,
    pub movement_count: i64,
    pub last_seq: Option<i64>,
}

/// One grouped row of the sales query.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SalesRow {
    pub store_id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    pub sale_count: i64,
    pub revenue_cents: i64,
}

/// Repository for the movement ledger.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    /// Creates a new MovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    // =========================================================================
    // Writes (transaction-scoped)
    // =========================================================================

    /// Appends a movement on `conn` and returns the stored entry.
    ///
    /// Callers validate `movement` and check existence beforehand; this only
    /// computes the signed delta and assigns `id`/`seq`.
    pub async fn append(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        actor: Option<&str>,
        movement: &NewMovement,
        occurred_at: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
    ) -> DbResult<StockMovement> {
        let id = generate_movement_id();
        let delta = signed_delta(movement.movement_type, movement.quantity);

        debug!(
            store_id = %movement.store_id,
            product_id = %movement.product_id,
            movement_type = %movement.movement_type,
            delta,
            "Appending movement"
        );

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_movements (
                id, tenant_id, store_id, product_id, movement_type, quantity, delta,
                unit_price_cents, reference, notes, actor, occurred_at, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            RETURNING seq
            "#,
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(&movement.store_id)
        .bind(&movement.product_id)
        .bind(movement.movement_type)
        .bind(movement.quantity)
        .bind(delta)
        .bind(movement.unit_price_cents)
        .bind(&movement.reference)
        .bind(&movement.notes)
        .bind(actor)
        .bind(occurred_at)
        .bind(recorded_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(StockMovement {
            seq,
            id,
            tenant_id: tenant_id.to_string(),
            store_id: movement.store_id.clone(),
            product_id: movement.product_id.clone(),
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            delta,
            unit_price_cents: movement.unit_price_cents,
            reference: movement.reference.clone(),
            notes: movement.notes.clone(),
            actor: actor.map(str::to_string),
            occurred_at,
            recorded_at,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a single ledger entry by id.
    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE tenant_id = ?1 AND id = ?2"
        );

        let movement = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(movement)
    }

    /// Lists a store's movements in chronological order (`occurred_at`, then `seq`).
    pub async fn list(
        &self,
        tenant_id: &str,
        store_id: &str,
        filter: &MovementFilter,
    ) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE tenant_id = ?1 AND store_id = ?2 \
               AND (?3 IS NULL OR product_id = ?3) \
               AND (?4 IS NULL OR movement_type = ?4) \
               AND (?5 IS NULL OR occurred_at >= ?5) \
               AND (?6 IS NULL OR occurred_at < ?6) \
             ORDER BY occurred_at, seq \
             LIMIT ?7 OFFSET ?8"
        );

        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(tenant_id)
            .bind(store_id)
            .bind(filter.product_id.as_deref())
            .bind(filter.movement_type)
            .bind(filter.range.map(|r| r.start))
            .bind(filter.range.map(|r| r.end))
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Ledger sum for one (store, product).
    pub async fn summary(&self, store_id: &str, product_id: &str) -> DbResult<LedgerSummary> {
        let mut conn = self.pool.acquire().await?;
        Self::summary_on(&mut conn, store_id, product_id).await
    }

    /// Ledger sum for one (store, product) on an existing connection.
    pub async fn summary_on(
        conn: &mut SqliteConnection,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<LedgerSummary> {
        let summary = sqlx::query_as::<_, LedgerSummary>(
            r#"
            SELECT
                COALESCE(SUM(delta), 0) AS quantity,
                COUNT(*) AS movement_count,
                MAX(seq) AS last_seq
            FROM stock_movements
            WHERE store_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(summary)
    }

    /// Distinct products with at least one movement at `store_id`.
    pub async fn products_with_movements(&self, store_id: &str) -> DbResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT product_id FROM stock_movements WHERE store_id = ?1 ORDER BY product_id",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// On-hand quantities replayed from the ledger up to and including `as_of`.
    ///
    /// Keys with no movements at or before `as_of` are omitted.
    pub async fn stock_levels_as_of(
        &self,
        tenant_id: &str,
        store_id: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> DbResult<Vec<StockLevel>> {
        debug!(store_id = ?store_id, as_of = %as_of, "Replaying ledger for stock levels");

        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT store_id, product_id, SUM(delta) AS quantity
            FROM stock_movements
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR store_id = ?2)
              AND occurred_at <= ?3
            GROUP BY store_id, product_id
            ORDER BY store_id, product_id
            "#,
        )
        .bind(tenant_id)
        .bind(store_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        Ok(levels)
    }

    /// Sales grouped by (store, product) within a half-open window.
    pub async fn sales(
        &self,
        tenant_id: &str,
        store_id: Option<&str>,
        range: &TimeRange,
    ) -> DbResult<Vec<SalesRow>> {
        debug!(store_id = ?store_id, start = %range.start, end = %range.end, "Aggregating sales");

        let rows = sqlx::query_as::<_, SalesRow>(
            r#"
            SELECT
                store_id,
                product_id,
                SUM(quantity) AS quantity_sold,
                COUNT(*) AS sale_count,
                COALESCE(SUM(quantity * unit_price_cents), 0) AS revenue_cents
            FROM stock_movements
            WHERE tenant_id = ?1
              AND movement_type = 'sale'
              AND (?2 IS NULL OR store_id = ?2)
              AND occurred_at >= ?3
              AND occurred_at < ?4
            GROUP BY store_id, product_id
            ORDER BY store_id, product_id
            "#,
        )
        .bind(tenant_id)
        .bind(store_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Generates a new movement ID.
pub fn generate_movement_id() -> String {
    Uuid::new_v4().to_string()
}
