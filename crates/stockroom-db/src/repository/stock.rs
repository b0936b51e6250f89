//! # Stock Repository
//!
//! The `current_stock` view: one row per (store, product) holding the
//! materialised on-hand quantity.
//!
//! ## Update Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Incremental update in the append tx                  │
//! │                                                                         │
//! │  UPDATE current_stock SET quantity = quantity + delta ...              │
//! │       │                                                                 │
//! │       ├── 1 row  → done (RETURNING quantity)                           │
//! │       │                                                                 │
//! │       └── 0 rows → INSERT ... SELECT SUM(delta) FROM stock_movements   │
//! │                    (first movement, or a row that went missing:        │
//! │                     the ledger already holds the new entry, so the     │
//! │                     materialised value is exact either way)            │
//! │                                                                         │
//! │  ✅ Delta update:  quantity = quantity - 3                              │
//! │  ❌ Absolute set:  quantity = 7   (lost update under concurrency)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::DbResult;
use crate::repository::movement::MovementRepository;
use stockroom_core::{CurrentStock, LowStockAlert, StockLevel};

const STOCK_COLUMNS: &str = "store_id, product_id, quantity, movement_count, last_seq, updated_at";

/// Repository for the current-stock view.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    // =========================================================================
    // Writes (transaction-scoped)
    // =========================================================================

    /// Folds one ledger entry into the view and returns the new quantity.
    ///
    /// Must run on the same connection/transaction that appended the entry.
    pub async fn apply_delta(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        store_id: &str,
        product_id: &str,
        delta: i64,
        seq: i64,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE current_stock SET
                quantity = quantity + ?3,
                movement_count = movement_count + 1,
                last_seq = ?4,
                updated_at = ?5
            WHERE store_id = ?1 AND product_id = ?2
            RETURNING quantity
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .bind(delta)
        .bind(seq)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(quantity) = updated {
            return Ok(quantity);
        }

        debug!(store_id, product_id, "No stock row yet, materialising from ledger");

        let quantity: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO current_stock (
                store_id, product_id, tenant_id, quantity, movement_count, last_seq, updated_at
            )
            SELECT ?1, ?2, ?3, COALESCE(SUM(delta), 0), COUNT(*), MAX(seq), ?4
            FROM stock_movements
            WHERE store_id = ?1 AND product_id = ?2
            RETURNING quantity
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .bind(tenant_id)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        Ok(quantity)
    }

    /// Creates an explicit zero record for a key with no ledger entries.
    ///
    /// Returns `true` if a row was created. An existing row is left alone.
    pub async fn initialize(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        store_id: &str,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO current_stock (
                store_id, product_id, tenant_id, quantity, movement_count, last_seq, updated_at
            )
            SELECT ?1, ?2, ?3, COALESCE(SUM(delta), 0), COUNT(*), MAX(seq), ?4
            FROM stock_movements
            WHERE store_id = ?1 AND product_id = ?2
            ON CONFLICT (store_id, product_id) DO NOTHING
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .bind(tenant_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Rebuilds one row from the ledger. Idempotent.
    ///
    /// With no ledger entries an existing row is reset to an explicit zero
    /// and no row is created. Returns the row as stored afterwards.
    pub async fn rebuild(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        store_id: &str,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<CurrentStock>> {
        let summary = MovementRepository::summary_on(&mut *conn, store_id, product_id).await?;

        if summary.movement_count == 0 {
            sqlx::query(
                r#"
                UPDATE current_stock
                SET quantity = 0, movement_count = 0, last_seq = NULL, updated_at = ?3
                WHERE store_id = ?1 AND product_id = ?2
                "#,
            )
            .bind(store_id)
            .bind(product_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO current_stock (
                    store_id, product_id, tenant_id, quantity, movement_count, last_seq, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (store_id, product_id) DO UPDATE SET
                    quantity = excluded.quantity,
                    movement_count = excluded.movement_count,
                    last_seq = excluded.last_seq,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(store_id)
            .bind(product_id)
            .bind(tenant_id)
            .bind(summary.quantity)
            .bind(summary.movement_count)
            .bind(summary.last_seq)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        info!(
            store_id,
            product_id,
            quantity = summary.quantity,
            movements = summary.movement_count,
            "Stock row rebuilt from ledger"
        );

        Self::get_on(conn, store_id, product_id).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets the view row for one key.
    pub async fn get(&self, store_id: &str, product_id: &str) -> DbResult<Option<CurrentStock>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_on(&mut conn, store_id, product_id).await
    }

    async fn get_on(
        conn: &mut SqliteConnection,
        store_id: &str,
        product_id: &str,
    ) -> DbResult<Option<CurrentStock>> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM current_stock WHERE store_id = ?1 AND product_id = ?2"
        );

        let row = sqlx::query_as::<_, CurrentStock>(&sql)
            .bind(store_id)
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row)
    }

    /// Quantities for every product of a store with at least one movement.
    pub async fn bulk(&self, store_id: &str) -> DbResult<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT product_id, quantity
            FROM current_stock
            WHERE store_id = ?1 AND movement_count > 0
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Every view row of a store, including zero-initialised ones.
    pub async fn list_for_store(&self, store_id: &str) -> DbResult<Vec<CurrentStock>> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM current_stock WHERE store_id = ?1 ORDER BY product_id"
        );

        let rows = sqlx::query_as::<_, CurrentStock>(&sql)
            .bind(store_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Live stock levels from the view, for one store or the whole tenant.
    pub async fn levels(&self, tenant_id: &str, store_id: Option<&str>) -> DbResult<Vec<StockLevel>> {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT store_id, product_id, quantity
            FROM current_stock
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR store_id = ?2)
              AND movement_count > 0
            ORDER BY store_id, product_id
            "#,
        )
        .bind(tenant_id)
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(levels)
    }

    /// Active products of a store at or below their low-stock threshold.
    pub async fn low_stock(&self, tenant_id: &str, store_id: &str) -> DbResult<Vec<LowStockAlert>> {
        let alerts = sqlx::query_as::<_, LowStockAlert>(
            r#"
            SELECT
                cs.store_id,
                cs.product_id,
                p.sku,
                cs.quantity,
                p.low_stock_threshold AS threshold,
                cs.updated_at AS raised_at
            FROM current_stock cs
            JOIN products p ON p.id = cs.product_id
            WHERE cs.tenant_id = ?1
              AND cs.store_id = ?2
              AND p.is_active = 1
              AND p.low_stock_threshold IS NOT NULL
              AND cs.quantity <= p.low_stock_threshold
            ORDER BY p.sku
            "#,
        )
        .bind(tenant_id)
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use stockroom_core::{MovementType, NewMovement, NewProduct, NewStore};

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db
            .stores()
            .insert(
                "t1",
                &NewStore {
                    name: "S1".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let mut product = NewProduct::new("P1", "Product one");
        product.low_stock_threshold = Some(10);
        let product = db.products().insert("t1", &product).await.unwrap();
        (db, store.id, product.id)
    }

    async fn record(db: &Database, s: &str, p: &str, kind: MovementType, qty: i64) -> i64 {
        let mut tx = db.begin().await.unwrap();
        let now = Utc::now();
        let movement = MovementRepository::append(
            &mut tx,
            "t1",
            None,
            &NewMovement::new(s, p, kind, qty),
            now,
            now,
        )
        .await
        .unwrap();
        let quantity =
            StockRepository::apply_delta(&mut tx, "t1", s, p, movement.delta, movement.seq, now)
                .await
                .unwrap();
        tx.commit().await.unwrap();
        quantity
    }

    #[tokio::test]
    async fn test_apply_delta_materialises_then_increments() {
        let (db, s, p) = setup().await;

        assert_eq!(record(&db, &s, &p, MovementType::StockIn, 100).await, 100);
        assert_eq!(record(&db, &s, &p, MovementType::Sale, 30).await, 70);
        assert_eq!(record(&db, &s, &p, MovementType::Removal, 10).await, 60);

        let row = db.stock().get(&s, &p).await.unwrap().unwrap();
        assert_eq!(row.quantity, 60);
        assert_eq!(row.movement_count, 3);

        let bulk = db.stock().bulk(&s).await.unwrap();
        assert_eq!(bulk.get(&p), Some(&60));
    }

    #[tokio::test]
    async fn test_missing_row_is_rematerialised_on_next_write() {
        let (db, s, p) = setup().await;
        record(&db, &s, &p, MovementType::StockIn, 50).await;

        sqlx::query("DELETE FROM current_stock")
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(record(&db, &s, &p, MovementType::Sale, 5).await, 45);
        let row = db.stock().get(&s, &p).await.unwrap().unwrap();
        assert_eq!(row.movement_count, 2);
    }

    #[tokio::test]
    async fn test_initialize_and_rebuild() {
        let (db, s, p) = setup().await;
        let now = Utc::now();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(StockRepository::initialize(&mut conn, "t1", &s, &p, now).await.unwrap());
        assert!(!StockRepository::initialize(&mut conn, "t1", &s, &p, now).await.unwrap());
        drop(conn);

        let row = db.stock().get(&s, &p).await.unwrap().unwrap();
        assert_eq!((row.quantity, row.movement_count), (0, 0));
        assert!(db.stock().bulk(&s).await.unwrap().is_empty());

        record(&db, &s, &p, MovementType::StockIn, 8).await;
        sqlx::query("UPDATE current_stock SET quantity = 999")
            .execute(db.pool())
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let rebuilt = StockRepository::rebuild(&mut conn, "t1", &s, &p, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rebuilt.quantity, 8);

        let again = StockRepository::rebuild(&mut conn, "t1", &s, &p, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.quantity, rebuilt.quantity);
        assert_eq!(again.movement_count, rebuilt.movement_count);
    }

    #[tokio::test]
    async fn test_low_stock_query() {
        let (db, s, p) = setup().await;
        record(&db, &s, &p, MovementType::StockIn, 20).await;
        assert!(db.stock().low_stock("t1", &s).await.unwrap().is_empty());

        record(&db, &s, &p, MovementType::Sale, 12).await;
        let alerts = db.stock().low_stock("t1", &s).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].quantity, 8);
        assert_eq!(alerts[0].threshold, 10);
        assert_eq!(alerts[0].sku, "P1");
    }
}
