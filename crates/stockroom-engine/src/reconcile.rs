//! # Reconciliation
//!
//! Keeps the current-stock view honest against the ledger.
//!
//! ## Repair Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  verify(S, P)                                                           │
//! │       │                                                                 │
//! │       ├── lock stock:{t}:{S}:{P}                                       │
//! │       ├── view row vs SUM(delta), COUNT(*) over the ledger             │
//! │       │                                                                 │
//! │       ├── equal ───────────────► VerifyOutcome { repaired: false }     │
//! │       │                                                                 │
//! │       └── different ──► warn! ConsistencyError                         │
//! │                         BEGIN                                           │
//! │                           rebuild row from ledger                       │
//! │                           audit REPAIR (recorded, expected)             │
//! │                         COMMIT                                          │
//! │                         invalidate cache                                │
//! │                         VerifyOutcome { repaired: true }                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rebuilding is idempotent: running it on a correct row rewrites the same
//! values. A repair that fails is the only way a `Consistency` error
//! reaches a caller.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

use stockroom_core::{AuditAction, CurrentStock, RequestContext};
use stockroom_db::{AuditRepository, NewAuditEntry, StockRepository};

use crate::error::{InventoryError, InventoryResult};
use crate::inventory::{within, InventoryEngine, KeyWrite};

/// Result of checking one (store, product) against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub store_id: String,
    pub product_id: String,
    /// Quantity in the view before the check (`None` if the row was missing).
    pub recorded: Option<i64>,
    /// Quantity the ledger sums to.
    pub expected: i64,
    pub movement_count: i64,
    pub repaired: bool,
}

impl InventoryEngine {
    /// Compares one key's view row with its ledger and repairs a mismatch.
    pub async fn verify(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        product_id: &str,
    ) -> InventoryResult<VerifyOutcome> {
        self.require_store(ctx, store_id).await?;
        self.require_product(ctx, product_id).await?;
        self.verify_key(ctx, store_id, product_id).await
    }

    /// Verifies every key of a store that has a view row or ledger entries.
    pub async fn verify_store(
        &self,
        ctx: &RequestContext,
        store_id: &str,
    ) -> InventoryResult<Vec<VerifyOutcome>> {
        self.require_store(ctx, store_id).await?;

        let mut outcomes = Vec::new();
        for product_id in self.known_products(store_id).await? {
            outcomes.push(self.verify_key(ctx, store_id, &product_id).await?);
        }

        let repaired = outcomes.iter().filter(|o| o.repaired).count();
        info!(store_id, keys = outcomes.len(), repaired, "Store verified");
        Ok(outcomes)
    }

    /// Rebuilds one key from the ledger unconditionally. Idempotent.
    ///
    /// Returns `None` for a key with no ledger entries and no row.
    pub async fn recompute(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        product_id: &str,
    ) -> InventoryResult<Option<CurrentStock>> {
        self.require_store(ctx, store_id).await?;
        self.require_product(ctx, product_id).await?;

        let write = self
            .begin_key_write(&ctx.tenant_id, store_id, product_id)
            .await?;
        self.rebuild_locked(ctx, &write, store_id, product_id, None).await
    }

    /// Rebuilds every key of a store. Returns how many keys were rebuilt.
    pub async fn recompute_store(&self, ctx: &RequestContext, store_id: &str) -> InventoryResult<usize> {
        self.require_store(ctx, store_id).await?;

        let products = self.known_products(store_id).await?;
        for product_id in &products {
            let write = self
                .begin_key_write(&ctx.tenant_id, store_id, product_id)
                .await?;
            self.rebuild_locked(ctx, &write, store_id, product_id, None).await?;
        }

        info!(store_id, keys = products.len(), "Store recomputed from ledger");
        Ok(products.len())
    }

    /// Read-path repair for a key whose view row was missing.
    ///
    /// The row is read again under the key lock first: a key's first write
    /// may have committed since the caller looked, and that is not damage.
    /// Returns the quantity, or `NotFound` when the ledger is empty too
    /// (nothing was ever recorded for the key).
    pub(crate) async fn repair_missing_row(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        product_id: &str,
    ) -> InventoryResult<i64> {
        let write = self
            .begin_key_write(&ctx.tenant_id, store_id, product_id)
            .await?;

        let row = self
            .with_retry("current_stock", move |_| async move {
                Ok::<_, InventoryError>(self.db.stock().get(store_id, product_id).await?)
            })
            .await?;
        if let Some(row) = row {
            debug!(store_id, product_id, "Stock row written while waiting for the key");
            return Ok(row.quantity);
        }

        let summary = self
            .with_retry("ledger_summary", move |_| async move {
                Ok::<_, InventoryError>(self.db.movements().summary(store_id, product_id).await?)
            })
            .await?;

        if summary.movement_count == 0 {
            return Err(InventoryError::not_found(
                "Stock",
                format!("{store_id}/{product_id}"),
            ));
        }

        let detected = InventoryError::Consistency {
            store_id: store_id.to_string(),
            product_id: product_id.to_string(),
            detail: format!(
                "view row missing, ledger holds {} movements",
                summary.movement_count
            ),
        };
        warn!(error = %detected, "Consistency error detected, rebuilding from ledger");

        let audit = json!({
            "recorded": Value::Null,
            "expected": summary.quantity,
            "movement_count": summary.movement_count,
            "trigger": "read",
        });

        let rebuilt = self
            .rebuild_locked(ctx, &write, store_id, product_id, Some(audit))
            .await
            .map_err(|e| repair_failed(store_id, product_id, e))?;

        Ok(rebuilt.map_or(0, |row| row.quantity))
    }

    async fn verify_key(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        product_id: &str,
    ) -> InventoryResult<VerifyOutcome> {
        let write = self
            .begin_key_write(&ctx.tenant_id, store_id, product_id)
            .await?;

        let row = self
            .with_retry("verify", move |_| async move {
                Ok::<_, InventoryError>(self.db.stock().get(store_id, product_id).await?)
            })
            .await?;
        let summary = self
            .with_retry("verify", move |_| async move {
                Ok::<_, InventoryError>(self.db.movements().summary(store_id, product_id).await?)
            })
            .await?;

        let recorded = row.as_ref().map(|r| r.quantity);
        let consistent = match &row {
            None => summary.movement_count == 0,
            Some(row) => {
                row.quantity == summary.quantity && row.movement_count == summary.movement_count
            }
        };

        let mut outcome = VerifyOutcome {
            store_id: store_id.to_string(),
            product_id: product_id.to_string(),
            recorded,
            expected: summary.quantity,
            movement_count: summary.movement_count,
            repaired: false,
        };
        if consistent {
            return Ok(outcome);
        }

        let detected = InventoryError::Consistency {
            store_id: store_id.to_string(),
            product_id: product_id.to_string(),
            detail: format!("view {recorded:?}, ledger {}", summary.quantity),
        };
        warn!(error = %detected, "Consistency error detected, rebuilding from ledger");

        let audit = json!({
            "recorded": recorded,
            "recorded_movement_count": row.as_ref().map(|r| r.movement_count),
            "expected": summary.quantity,
            "movement_count": summary.movement_count,
            "trigger": "verify",
        });
        self.rebuild_locked(ctx, &write, store_id, product_id, Some(audit))
            .await
            .map_err(|e| repair_failed(store_id, product_id, e))?;

        outcome.repaired = true;
        Ok(outcome)
    }

    /// Rebuilds one key while its write lock is held, optionally auditing
    /// the repair in the same transaction.
    async fn rebuild_locked(
        &self,
        ctx: &RequestContext,
        write: &KeyWrite<'_>,
        store_id: &str,
        product_id: &str,
        audit: Option<Value>,
    ) -> InventoryResult<Option<CurrentStock>> {
        let tenant = ctx.tenant_id.as_str();
        let actor = ctx.actor.as_deref();
        let deadline = write.deadline();
        let timeout = self.config.write_timeout();
        let audit = &audit;

        let rebuilt = self
            .with_retry("rebuild", move |_| async move {
                let mut tx = within(deadline, timeout, self.db.begin()).await?;
                let row = within(
                    deadline,
                    timeout,
                    StockRepository::rebuild(&mut tx, tenant, store_id, product_id, Utc::now()),
                )
                .await?;
                if let Some(details) = audit {
                    let entry = NewAuditEntry::new(
                        AuditAction::Repair,
                        "current_stock",
                        format!("{store_id}/{product_id}"),
                    )
                    .details(details.clone());
                    within(
                        deadline,
                        timeout,
                        AuditRepository::record_on(&mut tx, tenant, actor, entry),
                    )
                    .await?;
                }
                write.commit(tx).await?;
                Ok::<_, InventoryError>(row)
            })
            .await?;

        write.publish().await;

        if let Some(row) = &rebuilt {
            let product = self
                .with_retry("get_product", move |_| async move {
                    Ok::<_, InventoryError>(self.db.products().get(tenant, product_id).await?)
                })
                .await?;
            let alert = match product {
                Some(product) => {
                    self.refresh_low_stock_alert(tenant, &product, store_id, row.quantity)
                        .await
                }
                None => None,
            };
            self.notify(tenant, store_id, product_id, None, row.quantity, alert);
        }

        Ok(rebuilt)
    }

    /// Products of a store with a view row or at least one ledger entry.
    async fn known_products(&self, store_id: &str) -> InventoryResult<BTreeSet<String>> {
        let rows = self
            .with_retry("list_stock", move |_| async move {
                Ok::<_, InventoryError>(self.db.stock().list_for_store(store_id).await?)
            })
            .await?;
        let ledger = self
            .with_retry("products_with_movements", move |_| async move {
                Ok::<_, InventoryError>(self.db.movements().products_with_movements(store_id).await?)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.product_id)
            .chain(ledger)
            .collect())
    }
}

fn repair_failed(store_id: &str, product_id: &str, cause: InventoryError) -> InventoryError {
    error!(store_id, product_id, error = %cause, "Rebuild from ledger failed");
    InventoryError::Consistency {
        store_id: store_id.to_string(),
        product_id: product_id.to_string(),
        detail: format!("repair failed: {cause}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::tests::{ctx, engine, seed};
    use stockroom_core::{AuditFilter, MovementType, NewMovement};

    #[tokio::test]
    async fn test_verify_detects_and_repairs_corruption() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;
        engine
            .append(&ctx(), NewMovement::new(&store.id, &product.id, MovementType::StockIn, 20))
            .await
            .unwrap();

        // Warm the cache with the correct value, then corrupt the view.
        assert_eq!(engine.current_stock(&ctx(), &store.id, &product.id).await.unwrap(), 20);
        sqlx::query("UPDATE current_stock SET quantity = 999")
            .execute(engine.database().pool())
            .await
            .unwrap();

        let outcome = engine.verify(&ctx(), &store.id, &product.id).await.unwrap();
        assert!(outcome.repaired);
        assert_eq!(outcome.recorded, Some(999));
        assert_eq!(outcome.expected, 20);

        let again = engine.verify(&ctx(), &store.id, &product.id).await.unwrap();
        assert!(!again.repaired, "second verify finds nothing");
        assert_eq!(engine.current_stock(&ctx(), &store.id, &product.id).await.unwrap(), 20);

        let repairs = engine
            .audit_log(
                &ctx(),
                &AuditFilter {
                    action: Some(AuditAction::Repair),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(repairs.len(), 1);
        let details: Value = serde_json::from_str(repairs[0].details.as_deref().unwrap()).unwrap();
        assert_eq!(details["recorded"], 999);
        assert_eq!(details["expected"], 20);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;
        for (kind, qty) in [
            (MovementType::StockIn, 50),
            (MovementType::Sale, 7),
            (MovementType::Return, 2),
            (MovementType::Removal, 5),
        ] {
            engine
                .append(&ctx(), NewMovement::new(&store.id, &product.id, kind, qty))
                .await
                .unwrap();
        }

        let first = engine.recompute(&ctx(), &store.id, &product.id).await.unwrap().unwrap();
        let second = engine.recompute(&ctx(), &store.id, &product.id).await.unwrap().unwrap();
        assert_eq!(first.quantity, 40);
        assert_eq!(first.quantity, second.quantity);
        assert_eq!(first.movement_count, second.movement_count);
        assert_eq!(first.last_seq, second.last_seq);
    }

    #[tokio::test]
    async fn test_recompute_store_restores_every_key() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;
        let other = engine
            .create_product(&ctx(), stockroom_core::NewProduct::new("SNK-010", "Pretzels"))
            .await
            .unwrap();
        for p in [&product.id, &other.id] {
            engine
                .append(&ctx(), NewMovement::new(&store.id, p, MovementType::StockIn, 6))
                .await
                .unwrap();
        }

        sqlx::query("UPDATE current_stock SET quantity = 0")
            .execute(engine.database().pool())
            .await
            .unwrap();

        assert_eq!(engine.recompute_store(&ctx(), &store.id).await.unwrap(), 2);
        let bulk = engine.bulk_current_stock(&ctx(), &store.id).await.unwrap();
        assert_eq!(bulk.values().copied().collect::<Vec<_>>(), vec![6, 6]);
    }

    #[tokio::test]
    async fn test_verify_store_on_consistent_data() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;
        engine.initialize_stock(&ctx(), &store.id, &product.id).await.unwrap();

        let outcomes = engine.verify_store(&ctx(), &store.id).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].repaired);
        assert_eq!(outcomes[0].recorded, Some(0));
    }

    #[tokio::test]
    async fn test_verify_unknown_store_is_not_found() {
        let engine = engine().await;
        let err = engine.verify_store(&ctx(), "nope").await.unwrap_err();
        assert!(matches!(err, InventoryError::NotFound { .. }));
    }
}
