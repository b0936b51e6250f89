//! # Inventory Engine
//!
//! The façade collaborators call: movement appends, stock reads, stock
//! initialisation and low-stock alerts. Reconciliation, catalogue
//! management and reports live in sibling modules as further `impl` blocks.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  append(ctx, movement)                                                  │
//! │       │                                                                 │
//! │       ├── validate input, resolve store + product (pool reads)         │
//! │       │                                                                 │
//! │       ├── lock stock:{t}:{s}:{p}          ◄── bounded by write timeout │
//! │       │                                                                 │
//! │       ├── retry on transient errors:                                   │
//! │       │     BEGIN                                                       │
//! │       │     INSERT stock_movements          (ledger)                   │
//! │       │     UPDATE current_stock += delta   (view)                     │
//! │       │     policy check ── negative? ──► ROLLBACK, InsufficientStock  │
//! │       │     INSERT audit_log                (removals only)            │
//! │       │     COMMIT                                                      │
//! │       │                                                                 │
//! │       ├── bump generations, invalidate stock / bulk / report keys      │
//! │       ├── raise or clear the low-stock alert                           │
//! │       ├── send StockUpdated (+ LowStock) to watchers                   │
//! │       └── unlock, return AppendOutcome                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The write timeout covers the lock wait and the transaction body. A
//! commit that has started is allowed to finish (it is bounded by the
//! SQLite busy timeout), so a `Timeout` error always means nothing was
//! written.
//!
//! A caller that drops the future between COMMIT and the end of the
//! invalidation (a client disconnect) does not leave stale entries behind:
//! dropping the [`KeyWrite`] bumps the generations and queues the
//! invalidation on the cache layer, which applies it before the next lookup.
//!
//! ## Read Path
//! Cache first. On a miss the database is read and the value is cached
//! only if no write to the same scope landed in the meantime (see
//! [`crate::locks`]).

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use stockroom_core::cache_keys;
use stockroom_core::validation::{validate_id, validate_limit, validate_new_movement};
use stockroom_core::{
    AppendOutcome, AuditAction, LowStockAlert, MovementFilter, MovementType, NewMovement,
    Product, RequestContext, StockMovement, StockPolicy, Store, ValidationError,
};
use stockroom_db::{
    AuditRepository, Database, MovementRepository, NewAuditEntry, StockRepository,
};

use crate::cache::{CacheBackend, CacheLayer, CacheStats, MemoryCache, RedisCache};
use crate::config::{CacheMode, EngineConfig};
use crate::error::{InventoryError, InventoryResult};
use crate::events::{EventBus, StockEvent, StockWatch};
use crate::locks::{KeyLocks, ScopeGuard};
use crate::retry::{retry_transient, RetryPolicy};

// =============================================================================
// Engine
// =============================================================================

/// Multi-tenant inventory engine over one SQLite database and an optional
/// cache. Share it behind an `Arc`; every method takes `&self`.
pub struct InventoryEngine {
    pub(crate) db: Database,
    pub(crate) cache: CacheLayer,
    pub(crate) locks: KeyLocks,
    pub(crate) config: EngineConfig,
    events: EventBus,
    retry: RetryPolicy,
}

impl InventoryEngine {
    /// Opens the database and connects the configured cache backend.
    ///
    /// An unreachable Redis is not fatal: the engine starts without a cache
    /// and logs a warning.
    pub async fn new(config: EngineConfig) -> InventoryResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        let backend = connect_backend(&config).await;
        Ok(Self::with_backend(db, config, backend))
    }

    /// Builds an engine from parts (tests, embedding).
    pub fn with_backend(
        db: Database,
        config: EngineConfig,
        backend: Option<Arc<dyn CacheBackend>>,
    ) -> Self {
        let cache = CacheLayer::new(backend);
        info!(
            cache = cache.backend_name(),
            allow_negative_stock = config.stock.allow_negative_stock,
            write_timeout_ms = config.write.timeout_ms,
            "Inventory engine ready"
        );

        InventoryEngine {
            retry: RetryPolicy::from_settings(&config.write),
            db,
            cache,
            locks: KeyLocks::new(),
            events: EventBus::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Cache counters since start-up.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Database and cache reachability. The cache is reported separately
    /// because its failure only degrades performance.
    pub async fn health(&self) -> (bool, bool) {
        (self.db.health_check().await, self.cache.ping().await)
    }

    pub async fn close(&self) {
        self.db.close().await;
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    /// Every stock event of every tenant, for a trusted fan-out gateway.
    pub fn subscribe(&self) -> broadcast::Receiver<StockEvent> {
        self.events.subscribe()
    }

    /// Stock events one caller may see: a single store, or with `None`
    /// every store of the tenant within the caller's scope.
    pub async fn watch(
        &self,
        ctx: &RequestContext,
        store_id: Option<&str>,
    ) -> InventoryResult<StockWatch> {
        if let Some(store_id) = store_id {
            self.require_store(ctx, store_id).await?;
        }
        debug!(tenant_id = %ctx.tenant_id, ?store_id, "Stock watcher attached");
        Ok(StockWatch::new(
            self.events.subscribe(),
            ctx.clone(),
            store_id.map(str::to_string),
        ))
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Appends one movement and updates the stock view in the same
    /// transaction.
    ///
    /// ## Errors
    /// - `Validation` for bad input or an unknown/inactive store or product
    /// - `InsufficientStock` when the effective policy forbids the result
    /// - `Timeout` if the key stayed locked or the store stalled too long
    /// - `Unavailable` after the retry budget for transient errors is spent
    pub async fn append(
        &self,
        ctx: &RequestContext,
        movement: NewMovement,
    ) -> InventoryResult<AppendOutcome> {
        let now = Utc::now();
        validate_new_movement(&movement, now)?;

        let store = self.writable_store(ctx, &movement.store_id).await?;
        let product = self.writable_product(ctx, &movement.product_id).await?;
        let policy = self
            .config
            .stock_policy()
            .effective(store.allow_negative_stock);
        let occurred_at = movement.occurred_at.unwrap_or(now);

        let tenant = ctx.tenant_id.as_str();
        let actor = ctx.actor.as_deref();
        let timeout = self.config.write_timeout();
        let movement = &movement;

        let write = self
            .begin_key_write(tenant, &movement.store_id, &movement.product_id)
            .await?;
        let deadline = write.deadline();
        let key_write = &write;

        let (recorded, quantity) = retry_transient(&self.retry, "append", move |_| async move {
            let mut tx = within(deadline, timeout, self.db.begin()).await?;
            let staged = within(
                deadline,
                timeout,
                stage_append(&mut tx, tenant, actor, movement, policy, occurred_at),
            )
            .await?;
            key_write.commit(tx).await?;
            Ok::<_, InventoryError>(staged)
        })
        .await?;

        write.publish().await;
        let alert = self
            .refresh_low_stock_alert(tenant, &product, &movement.store_id, quantity)
            .await;
        let low_stock = alert.is_some();
        self.notify(
            tenant,
            &movement.store_id,
            &movement.product_id,
            Some(recorded.clone()),
            quantity,
            alert,
        );
        drop(write);

        info!(
            store_id = %recorded.store_id,
            product_id = %recorded.product_id,
            movement_type = %recorded.movement_type,
            delta = recorded.delta,
            quantity,
            seq = recorded.seq,
            "Movement appended"
        );

        Ok(AppendOutcome {
            movement: recorded,
            current_stock: quantity,
            low_stock,
        })
    }

    /// Records an explicit zero for a key with no movements, so point reads
    /// return 0 instead of `NotFound`. Bulk reads still omit it.
    ///
    /// Returns `false` if the key already had a stock row.
    pub async fn initialize_stock(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        product_id: &str,
    ) -> InventoryResult<bool> {
        self.writable_store(ctx, store_id).await?;
        self.writable_product(ctx, product_id).await?;

        let tenant = ctx.tenant_id.as_str();
        let timeout = self.config.write_timeout();
        let write = self.begin_key_write(tenant, store_id, product_id).await?;
        let deadline = write.deadline();
        let key_write = &write;

        let created = retry_transient(&self.retry, "initialize_stock", move |_| async move {
            let mut tx = within(deadline, timeout, self.db.begin()).await?;
            let created = within(
                deadline,
                timeout,
                StockRepository::initialize(&mut tx, tenant, store_id, product_id, Utc::now()),
            )
            .await?;
            key_write.commit(tx).await?;
            Ok::<_, InventoryError>(created)
        })
        .await?;

        if created {
            write.publish().await;
            self.notify(tenant, store_id, product_id, None, 0, None);
            info!(store_id, product_id, "Stock initialised at zero");
        } else {
            write.settle();
            debug!(store_id, product_id, "Stock row already present");
        }
        Ok(created)
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// On-hand quantity for one (store, product).
    ///
    /// ## Errors
    /// - `NotFound` for an unknown or out-of-scope store/product, or a key
    ///   with neither movements nor an explicit zero record
    /// - `Consistency` only if a missing view row could not be rebuilt
    pub async fn current_stock(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        product_id: &str,
    ) -> InventoryResult<i64> {
        validate_id("store_id", store_id)?;
        validate_id("product_id", product_id)?;
        if !ctx.can_access_store(store_id) {
            return Err(InventoryError::not_found("Store", store_id));
        }

        let tenant = ctx.tenant_id.as_str();
        let key = cache_keys::stock(tenant, store_id, product_id);
        if let Some(quantity) = self.cache.get_json::<i64>(&key).await {
            return Ok(quantity);
        }

        self.require_store(ctx, store_id).await?;
        self.require_product(ctx, product_id).await?;

        let ticket = self.locks.ticket(&key);
        let row = self
            .with_retry("current_stock", move |_| async move {
                Ok::<_, InventoryError>(self.db.stock().get(store_id, product_id).await?)
            })
            .await?;

        let quantity = match row {
            Some(row) => row.quantity,
            None => self.repair_missing_row(ctx, store_id, product_id).await?,
        };

        let ttl = self.config.stock_ttl();
        ticket
            .publish(|| self.cache.set_json(&key, &quantity, ttl))
            .await;
        Ok(quantity)
    }

    /// Quantities of every product of a store with at least one movement.
    ///
    /// A product whose view row went missing is rebuilt from the ledger
    /// before the map is returned.
    pub async fn bulk_current_stock(
        &self,
        ctx: &RequestContext,
        store_id: &str,
    ) -> InventoryResult<BTreeMap<String, i64>> {
        validate_id("store_id", store_id)?;
        if !ctx.can_access_store(store_id) {
            return Err(InventoryError::not_found("Store", store_id));
        }

        let tenant = ctx.tenant_id.as_str();
        let key = cache_keys::stock_bulk(tenant, store_id);
        if let Some(levels) = self.cache.get_json::<BTreeMap<String, i64>>(&key).await {
            return Ok(levels);
        }

        self.require_store(ctx, store_id).await?;

        let ticket = self.locks.ticket(&key);
        let mut levels = self.read_bulk(store_id).await?;
        let ledger_products = self
            .with_retry("bulk_current_stock", move |_| async move {
                Ok::<_, InventoryError>(self.db.movements().products_with_movements(store_id).await?)
            })
            .await?;

        let missing: Vec<String> = ledger_products
            .into_iter()
            .filter(|product_id| !levels.contains_key(product_id))
            .collect();
        if !missing.is_empty() {
            for product_id in &missing {
                self.repair_missing_row(ctx, store_id, product_id).await?;
            }
            levels = self.read_bulk(store_id).await?;
        }

        let ttl = self.config.stock_ttl();
        ticket.publish(|| self.cache.set_json(&key, &levels, ttl)).await;
        Ok(levels)
    }

    async fn read_bulk(&self, store_id: &str) -> InventoryResult<BTreeMap<String, i64>> {
        self.with_retry("bulk_current_stock", move |_| async move {
            Ok::<_, InventoryError>(self.db.stock().bulk(store_id).await?)
        })
        .await
    }

    /// Ledger entries of a store in chronological order.
    pub async fn list_movements(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        filter: &MovementFilter,
    ) -> InventoryResult<Vec<StockMovement>> {
        validate_limit(filter.limit)?;
        self.require_store(ctx, store_id).await?;
        if let Some(product_id) = &filter.product_id {
            self.require_product(ctx, product_id).await?;
        }

        let tenant = ctx.tenant_id.as_str();
        self.with_retry("list_movements", move |_| async move {
            Ok::<_, InventoryError>(self.db.movements().list(tenant, store_id, filter).await?)
        })
        .await
    }

    /// One ledger entry by id.
    pub async fn movement(&self, ctx: &RequestContext, id: &str) -> InventoryResult<StockMovement> {
        validate_id("movement_id", id)?;
        let tenant = ctx.tenant_id.as_str();
        let movement = self
            .with_retry("get_movement", move |_| async move {
                Ok::<_, InventoryError>(self.db.movements().get(tenant, id).await?)
            })
            .await?
            .filter(|m| ctx.can_access_store(&m.store_id))
            .ok_or_else(|| InventoryError::not_found("Movement", id))?;
        Ok(movement)
    }

    /// Active products of a store at or below their threshold.
    pub async fn low_stock_alerts(
        &self,
        ctx: &RequestContext,
        store_id: &str,
    ) -> InventoryResult<Vec<LowStockAlert>> {
        self.require_store(ctx, store_id).await?;
        let tenant = ctx.tenant_id.as_str();
        self.with_retry("low_stock_alerts", move |_| async move {
            Ok::<_, InventoryError>(self.db.stock().low_stock(tenant, store_id).await?)
        })
        .await
    }

    // =========================================================================
    // Shared Helpers
    // =========================================================================

    pub(crate) async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> InventoryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = InventoryResult<T>>,
    {
        retry_transient(&self.retry, operation, op).await
    }

    /// Takes the write lock of one stock key, waiting at most the write
    /// timeout.
    pub(crate) async fn begin_key_write(
        &self,
        tenant_id: &str,
        store_id: &str,
        product_id: &str,
    ) -> InventoryResult<KeyWrite<'_>> {
        let timeout = self.config.write_timeout();
        let deadline = Instant::now() + timeout;
        let scope = cache_keys::stock(tenant_id, store_id, product_id);

        let guard = tokio::time::timeout_at(deadline, self.locks.lock(&scope))
            .await
            .map_err(|_| {
                warn!(store_id, product_id, ?timeout, "Timed out waiting for stock key");
                InventoryError::Timeout(timeout)
            })?;

        Ok(KeyWrite {
            engine: self,
            tenant_id: tenant_id.to_string(),
            store_id: store_id.to_string(),
            product_id: product_id.to_string(),
            deadline,
            unpublished: AtomicBool::new(false),
            guard,
        })
    }

    /// Marks store and tenant scopes as changed and drops every cache entry
    /// derived from (store, product).
    async fn publish_scopes(&self, tenant_id: &str, store_id: &str, product_id: &str) {
        let store_guard = self.locks.lock(&cache_keys::stock_bulk(tenant_id, store_id)).await;
        let tenant_guard = self.locks.lock(&tenant_scope(tenant_id)).await;
        store_guard.bump();
        tenant_guard.bump();

        let invalidation = cache_keys::for_write(tenant_id, store_id, product_id);
        if !self.cache.invalidate(&invalidation).await {
            warn!(
                store_id,
                product_id,
                "Cache invalidation incomplete, affected keys bypass the cache until it succeeds"
            );
        }

        drop(tenant_guard);
        drop(store_guard);
    }

    /// Raises or clears the cached low-stock alert. Returns the alert when
    /// the product is low.
    pub(crate) async fn refresh_low_stock_alert(
        &self,
        tenant_id: &str,
        product: &Product,
        store_id: &str,
        quantity: i64,
    ) -> Option<LowStockAlert> {
        let threshold = product.low_stock_threshold?;
        let key = cache_keys::low_stock_alert(tenant_id, store_id, &product.id);

        if product.is_low(quantity) {
            warn!(
                store_id,
                product_id = %product.id,
                sku = %product.sku,
                quantity,
                threshold,
                "Low stock"
            );
            let alert = LowStockAlert {
                store_id: store_id.to_string(),
                product_id: product.id.clone(),
                sku: product.sku.clone(),
                quantity,
                threshold,
                raised_at: Utc::now(),
            };
            self.cache
                .set_json(&key, &alert, self.config.alert_ttl())
                .await;
            Some(alert)
        } else {
            self.cache.delete(&key).await;
            None
        }
    }

    /// Tells watchers about a committed change. Call with the key's write
    /// lock held so events follow commit order.
    pub(crate) fn notify(
        &self,
        tenant_id: &str,
        store_id: &str,
        product_id: &str,
        movement: Option<StockMovement>,
        current_stock: i64,
        alert: Option<LowStockAlert>,
    ) {
        self.events.send(StockEvent::StockUpdated {
            tenant_id: tenant_id.to_string(),
            store_id: store_id.to_string(),
            product_id: product_id.to_string(),
            movement,
            current_stock,
            at: Utc::now(),
        });
        if let Some(alert) = alert {
            self.events.send(StockEvent::LowStock {
                tenant_id: tenant_id.to_string(),
                alert,
            });
        }
    }

    // =========================================================================
    // Reference Resolution
    // =========================================================================

    async fn visible_store(&self, ctx: &RequestContext, store_id: &str) -> InventoryResult<Option<Store>> {
        validate_id("store_id", store_id)?;
        if !ctx.can_access_store(store_id) {
            debug!(store_id, "Store outside request scope");
            return Ok(None);
        }
        let tenant = ctx.tenant_id.as_str();
        self.with_retry("get_store", move |_| async move {
            Ok::<_, InventoryError>(self.db.stores().get(tenant, store_id).await?)
        })
        .await
    }

    async fn visible_product(
        &self,
        ctx: &RequestContext,
        product_id: &str,
    ) -> InventoryResult<Option<Product>> {
        validate_id("product_id", product_id)?;
        let tenant = ctx.tenant_id.as_str();
        self.with_retry("get_product", move |_| async move {
            Ok::<_, InventoryError>(self.db.products().get(tenant, product_id).await?)
        })
        .await
    }

    /// Store for a read. Unknown and out-of-scope both read as `NotFound`.
    pub(crate) async fn require_store(&self, ctx: &RequestContext, store_id: &str) -> InventoryResult<Store> {
        self.visible_store(ctx, store_id)
            .await?
            .ok_or_else(|| InventoryError::not_found("Store", store_id))
    }

    pub(crate) async fn require_product(
        &self,
        ctx: &RequestContext,
        product_id: &str,
    ) -> InventoryResult<Product> {
        self.visible_product(ctx, product_id)
            .await?
            .ok_or_else(|| InventoryError::not_found("Product", product_id))
    }

    /// Store for a write: must exist, be in scope and be active.
    async fn writable_store(&self, ctx: &RequestContext, store_id: &str) -> InventoryResult<Store> {
        let store = self
            .visible_store(ctx, store_id)
            .await?
            .ok_or_else(|| unknown("Store", store_id))?;
        if !store.is_active {
            return Err(inactive("Store", store_id));
        }
        Ok(store)
    }

    async fn writable_product(&self, ctx: &RequestContext, product_id: &str) -> InventoryResult<Product> {
        let product = self
            .visible_product(ctx, product_id)
            .await?
            .ok_or_else(|| unknown("Product", product_id))?;
        if !product.is_active {
            return Err(inactive("Product", product_id));
        }
        Ok(product)
    }
}

impl std::fmt::Debug for InventoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("cache", &self.cache)
            .field("locked_keys", &self.locks.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Key Write
// =============================================================================

/// A held write lock on one stock key. Dropping it releases the lock.
pub(crate) struct KeyWrite<'a> {
    engine: &'a InventoryEngine,
    tenant_id: String,
    store_id: String,
    product_id: String,
    deadline: Instant,
    /// Set from the start of COMMIT until `publish` or `settle` finishes.
    unpublished: AtomicBool,
    guard: ScopeGuard<'a>,
}

impl KeyWrite<'_> {
    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Commits `tx` on behalf of this key. A failed commit rolled back, so
    /// there is nothing to publish.
    pub(crate) async fn commit(&self, tx: Transaction<'_, Sqlite>) -> InventoryResult<()> {
        self.unpublished.store(true, Ordering::Release);
        if let Err(e) = tx.commit().await {
            self.unpublished.store(false, Ordering::Release);
            return Err(e.into());
        }
        Ok(())
    }

    /// Call after COMMIT, before answering the caller.
    pub(crate) async fn publish(&self) {
        self.guard.bump();
        self.engine
            .publish_scopes(&self.tenant_id, &self.store_id, &self.product_id)
            .await;
        self.unpublished.store(false, Ordering::Release);
    }

    /// For a commit that changed nothing cached.
    pub(crate) fn settle(&self) {
        self.unpublished.store(false, Ordering::Release);
    }
}

impl Drop for KeyWrite<'_> {
    fn drop(&mut self) {
        if !self.unpublished.load(Ordering::Acquire) {
            return;
        }

        // Cancelled between COMMIT and the end of publish. The key lock is
        // still held here, so no fill for this key can land before the bump.
        let engine = self.engine;
        self.guard.bump();
        engine.locks.bump(&cache_keys::stock_bulk(&self.tenant_id, &self.store_id));
        engine.locks.bump(&tenant_scope(&self.tenant_id));
        engine.cache.defer(&cache_keys::for_write(
            &self.tenant_id,
            &self.store_id,
            &self.product_id,
        ));
        warn!(
            store_id = %self.store_id,
            product_id = %self.product_id,
            "Write cancelled after commit, cache invalidation deferred"
        );
    }
}

// =============================================================================
// Free Helpers
// =============================================================================

/// Lock scope guarding cross-store report fills for a tenant.
pub(crate) fn tenant_scope(tenant_id: &str) -> String {
    format!("tenant:{tenant_id}")
}

/// Runs `fut` unless `deadline` passes first.
pub(crate) async fn within<T, E, Fut>(deadline: Instant, timeout: Duration, fut: Fut) -> InventoryResult<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<InventoryError>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(?timeout, "Write exceeded its deadline, rolling back");
            Err(InventoryError::Timeout(timeout))
        }
    }
}

/// Ledger insert, view update, policy check and removal audit, all on the
/// caller's transaction.
async fn stage_append(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    actor: Option<&str>,
    movement: &NewMovement,
    policy: StockPolicy,
    occurred_at: DateTime<Utc>,
) -> InventoryResult<(StockMovement, i64)> {
    let recorded_at = Utc::now();
    let recorded =
        MovementRepository::append(&mut *conn, tenant_id, actor, movement, occurred_at, recorded_at)
            .await?;

    let quantity = StockRepository::apply_delta(
        &mut *conn,
        tenant_id,
        &recorded.store_id,
        &recorded.product_id,
        recorded.delta,
        recorded.seq,
        recorded_at,
    )
    .await?;

    // Dropping the transaction on this error rolls the ledger insert back.
    policy.apply(
        &recorded.store_id,
        &recorded.product_id,
        quantity - recorded.delta,
        recorded.delta,
    )?;

    if recorded.movement_type == MovementType::Removal {
        let entry = NewAuditEntry::new(AuditAction::Removal, "stock_movement", recorded.id.clone())
            .details(json!({
                "store_id": recorded.store_id,
                "product_id": recorded.product_id,
                "quantity": recorded.quantity,
                "reference": recorded.reference,
                "notes": recorded.notes,
            }));
        AuditRepository::record_on(&mut *conn, tenant_id, actor, entry).await?;
    }

    Ok((recorded, quantity))
}

fn unknown(entity: &str, id: &str) -> InventoryError {
    ValidationError::UnknownReference {
        entity: entity.to_string(),
        id: id.to_string(),
    }
    .into()
}

fn inactive(entity: &str, id: &str) -> InventoryError {
    ValidationError::Inactive {
        entity: entity.to_string(),
        id: id.to_string(),
    }
    .into()
}

async fn connect_backend(config: &EngineConfig) -> Option<Arc<dyn CacheBackend>> {
    match config.cache.backend {
        CacheMode::None => None,
        CacheMode::Memory => Some(Arc::new(MemoryCache::new())),
        CacheMode::Redis => {
            let url = config.cache.redis_url.as_deref()?;
            match RedisCache::connect(url).await {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, running without a cache");
                    None
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
