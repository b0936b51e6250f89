//! # Reporting
//!
//! Stock-levels and sales reports, read through the cache.
//!
//! ```text
//! ┌───────────────────────────────┬────────────────────────────────────────┐
//! │ Report                        │ Source                                  │
//! ├───────────────────────────────┼────────────────────────────────────────┤
//! │ stock_levels(store?, None)    │ current_stock view                      │
//! │ stock_levels(store?, Some(t)) │ SUM(delta) over ledger, occurred_at ≤ t │
//! │ sales(store?, [start, end))   │ sale movements, occurred_at in window   │
//! └───────────────────────────────┴────────────────────────────────────────┘
//! ```
//!
//! A single-store report is filled under that store's scope and a
//! cross-store report under the tenant scope, so any committed write to a
//! covered key discards a fill that raced it. Cross-store reports are cached
//! unfiltered and narrowed to the caller's allowed stores on the way out.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tracing::debug;

use stockroom_core::cache_keys;
use stockroom_core::validation::validate_range;
use stockroom_core::{
    Money, RequestContext, SalesLine, SalesReport, StockLevelsReport, TimeRange,
};

use crate::error::{InventoryError, InventoryResult};
use crate::inventory::{tenant_scope, InventoryEngine};

impl InventoryEngine {
    /// On-hand quantities for one store or, with `None`, every store the
    /// caller may see.
    ///
    /// `as_of = None` reads the live view; `Some(t)` replays the ledger up to
    /// and including `t`. Keys without movements are omitted either way.
    pub async fn stock_levels(
        &self,
        ctx: &RequestContext,
        store_id: Option<&str>,
        as_of: Option<DateTime<Utc>>,
    ) -> InventoryResult<StockLevelsReport> {
        if let Some(store_id) = store_id {
            self.require_store(ctx, store_id).await?;
        }
        let tenant = ctx.tenant_id.as_str();
        let key = cache_keys::stock_levels_report(tenant, store_id, as_of);

        let mut report: StockLevelsReport = self
            .cached_report(tenant, store_id, &key, move || async move {
                let levels = match as_of {
                    None => {
                        self.with_retry("stock_levels", move |_| async move {
                            Ok::<_, InventoryError>(self.db.stock().levels(tenant, store_id).await?)
                        })
                        .await?
                    }
                    Some(as_of) => {
                        self.with_retry("stock_levels_as_of", move |_| async move {
                            Ok::<_, InventoryError>(
                                self.db
                                    .movements()
                                    .stock_levels_as_of(tenant, store_id, as_of)
                                    .await?,
                            )
                        })
                        .await?
                    }
                };
                Ok::<_, InventoryError>(StockLevelsReport::new(as_of, levels))
            })
            .await?;

        report.levels.retain(|level| ctx.can_access_store(&level.store_id));
        Ok(report)
    }

    /// Units sold and revenue per (store, product) within `range`.
    pub async fn sales(
        &self,
        ctx: &RequestContext,
        store_id: Option<&str>,
        range: TimeRange,
    ) -> InventoryResult<SalesReport> {
        validate_range(&range)?;
        if let Some(store_id) = store_id {
            self.require_store(ctx, store_id).await?;
        }
        let tenant = ctx.tenant_id.as_str();
        let key = cache_keys::sales_report(tenant, store_id, &range);
        let range_ref = &range;

        let report: SalesReport = self
            .cached_report(tenant, store_id, &key, move || async move {
                let rows = self
                    .with_retry("sales_report", move |_| async move {
                        Ok::<_, InventoryError>(
                            self.db.movements().sales(tenant, store_id, range_ref).await?,
                        )
                    })
                    .await?;

                let lines = rows
                    .into_iter()
                    .map(|row| SalesLine {
                        store_id: row.store_id,
                        product_id: row.product_id,
                        quantity_sold: row.quantity_sold,
                        sale_count: row.sale_count,
                        revenue: Money::from_cents(row.revenue_cents),
                    })
                    .collect();
                Ok::<_, InventoryError>(SalesReport::from_lines(*range_ref, lines))
            })
            .await?;

        if ctx.allowed_stores.is_none() {
            return Ok(report);
        }
        let lines = report
            .lines
            .into_iter()
            .filter(|line| ctx.can_access_store(&line.store_id))
            .collect();
        Ok(SalesReport::from_lines(report.range, lines))
    }

    /// Serves `key` from the cache or computes it, publishing the result only
    /// if no write to the report's scope committed in between.
    async fn cached_report<T, F, Fut>(
        &self,
        tenant_id: &str,
        store_id: Option<&str>,
        key: &str,
        compute: F,
    ) -> InventoryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = InventoryResult<T>>,
    {
        if let Some(report) = self.cache.get_json::<T>(key).await {
            debug!(key, "Report served from cache");
            return Ok(report);
        }

        let scope = match store_id {
            Some(store_id) => cache_keys::stock_bulk(tenant_id, store_id),
            None => tenant_scope(tenant_id),
        };
        let ticket = self.locks.ticket(&scope);
        let report = compute().await?;

        let ttl = self.config.report_ttl();
        ticket
            .publish(|| self.cache.set_json(key, &report, ttl))
            .await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::tests::{ctx, engine, seed, TENANT};
    use chrono::{Duration, TimeZone};
    use stockroom_core::{
        MovementType, NewMovement, NewProduct, NewStore, MAX_MOVEMENT_QUANTITY,
        MAX_UNIT_PRICE_CENTS,
    };

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).single().unwrap()
    }

    #[tokio::test]
    async fn test_sales_report_counts_only_sales_in_window() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;

        for (kind, qty, hour, price) in [
            (MovementType::StockIn, 100, 8, 80),
            (MovementType::Sale, 3, 9, 250),
            (MovementType::Sale, 2, 11, 250),
            (MovementType::Return, 1, 11, 250),
            (MovementType::Removal, 4, 12, 0),
            (MovementType::Sale, 5, 14, 250),
        ] {
            let movement = NewMovement::new(&store.id, &product.id, kind, qty)
                .at(at(hour))
                .priced(price);
            engine.append(&ctx(), movement).await.unwrap();
        }

        let range = TimeRange::new(at(9), at(14)).unwrap();
        let report = engine.sales(&ctx(), Some(&store.id), range).await.unwrap();

        assert_eq!(report.lines.len(), 1);
        assert_eq!(report.lines[0].quantity_sold, 5);
        assert_eq!(report.lines[0].sale_count, 2);
        assert_eq!(report.total_quantity, 5);
        assert_eq!(report.total_revenue, Money::from_cents(1250));
    }

    #[tokio::test]
    async fn test_stock_levels_as_of_is_inclusive() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;
        engine
            .append(
                &ctx(),
                NewMovement::new(&store.id, &product.id, MovementType::StockIn, 40).at(at(8)),
            )
            .await
            .unwrap();
        engine
            .append(
                &ctx(),
                NewMovement::new(&store.id, &product.id, MovementType::Sale, 15).at(at(10)),
            )
            .await
            .unwrap();

        let before = engine.stock_levels(&ctx(), Some(&store.id), Some(at(7))).await.unwrap();
        assert!(before.levels.is_empty());

        let at_receipt = engine.stock_levels(&ctx(), Some(&store.id), Some(at(8))).await.unwrap();
        assert_eq!(at_receipt.total_quantity(), 40);

        let live = engine.stock_levels(&ctx(), Some(&store.id), None).await.unwrap();
        assert_eq!(live.total_quantity(), 25);
        assert!(live.as_of.is_none());
    }

    #[tokio::test]
    async fn test_cached_report_is_invalidated_by_write() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;
        engine
            .append(&ctx(), NewMovement::new(&store.id, &product.id, MovementType::StockIn, 10))
            .await
            .unwrap();

        let first = engine.stock_levels(&ctx(), None, None).await.unwrap();
        assert_eq!(first.total_quantity(), 10);
        let key = cache_keys::stock_levels_report(TENANT, None, None);
        assert!(engine.cache.get_json::<StockLevelsReport>(&key).await.is_some());

        engine
            .append(&ctx(), NewMovement::new(&store.id, &product.id, MovementType::Sale, 4))
            .await
            .unwrap();
        assert!(engine.cache.get_json::<StockLevelsReport>(&key).await.is_none());

        let second = engine.stock_levels(&ctx(), None, None).await.unwrap();
        assert_eq!(second.total_quantity(), 6);
    }

    #[tokio::test]
    async fn test_cross_store_report_respects_scope() {
        let engine = engine().await;
        let (main, product) = seed(&engine).await;
        let depot = engine
            .create_store(
                &ctx(),
                NewStore {
                    name: "Depot".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let other = engine
            .create_product(&ctx(), NewProduct::new("BEV-002", "Lemonade"))
            .await
            .unwrap();

        for (store, p, qty) in [(&main, &product, 5), (&depot, &product, 7), (&depot, &other, 9)] {
            engine
                .append(&ctx(), NewMovement::new(&store.id, &p.id, MovementType::StockIn, qty))
                .await
                .unwrap();
        }

        let full = engine.stock_levels(&ctx(), None, None).await.unwrap();
        assert_eq!(full.levels.len(), 3);

        let scoped = RequestContext::new(TENANT).with_allowed_stores([depot.id.clone()]);
        let narrowed = engine.stock_levels(&scoped, None, None).await.unwrap();
        assert_eq!(narrowed.total_quantity(), 16);
        assert!(narrowed.levels.iter().all(|l| l.store_id == depot.id));

        let err = engine.stock_levels(&scoped, Some(&main.id), None).await.unwrap_err();
        assert!(matches!(err, InventoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_sales_rejects_inverted_range() {
        let engine = engine().await;
        let range = TimeRange {
            start: at(12),
            end: at(12) - Duration::hours(1),
        };
        let err = engine.sales(&ctx(), None, range).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_sales_revenue_at_price_ceiling() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;

        let err = engine
            .append(
                &ctx(),
                NewMovement::new(&store.id, &product.id, MovementType::Sale, 2)
                    .priced(i64::MAX / 2 + 1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));

        for _ in 0..2 {
            for (kind, price) in [
                (MovementType::StockIn, 0),
                (MovementType::Sale, MAX_UNIT_PRICE_CENTS),
            ] {
                let movement =
                    NewMovement::new(&store.id, &product.id, kind, MAX_MOVEMENT_QUANTITY)
                        .priced(price);
                engine.append(&ctx(), movement).await.unwrap();
            }
        }

        let now = Utc::now();
        let range = TimeRange::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap();
        let report = engine.sales(&ctx(), Some(&store.id), range).await.unwrap();
        assert_eq!(report.total_quantity, 2 * MAX_MOVEMENT_QUANTITY);
        assert_eq!(
            report.total_revenue,
            Money::from_cents(2 * MAX_MOVEMENT_QUANTITY * MAX_UNIT_PRICE_CENTS)
        );
    }
}
