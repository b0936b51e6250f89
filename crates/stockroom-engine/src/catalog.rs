//! # Catalog
//!
//! Store and product records plus read access to the audit log.
//!
//! Stores and products are never deleted. Deactivation keeps their ledger
//! history readable and rejects new movements against them. Every mutation
//! here writes an audit entry with the fields it changed.

use serde_json::{json, Value};
use tracing::{debug, info};

use stockroom_core::cache_keys;
use stockroom_core::validation::{
    validate_limit, validate_name, validate_new_product, validate_new_store,
    validate_range, validate_threshold,
};
use stockroom_core::{
    AuditAction, AuditFilter, AuditLog, NewProduct, NewStore, Product, ProductUpdate,
    RequestContext, Store, StoreUpdate,
};
use stockroom_db::NewAuditEntry;

use crate::error::{InventoryError, InventoryResult};
use crate::inventory::InventoryEngine;

impl InventoryEngine {
    // =========================================================================
    // Stores
    // =========================================================================

    pub async fn create_store(&self, ctx: &RequestContext, input: NewStore) -> InventoryResult<Store> {
        validate_new_store(&input)?;
        let tenant = ctx.tenant_id.as_str();
        let input = &input;

        let store = self
            .with_retry("create_store", move |_| async move {
                Ok::<_, InventoryError>(self.db.stores().insert(tenant, input).await?)
            })
            .await?;

        self.audit(
            ctx,
            AuditAction::Create,
            "store",
            &store.id,
            json!({
                "name": store.name,
                "location": store.location,
                "allow_negative_stock": store.allow_negative_stock,
            }),
        )
        .await?;

        info!(store_id = %store.id, name = %store.name, "Store created");
        Ok(store)
    }

    pub async fn get_store(&self, ctx: &RequestContext, store_id: &str) -> InventoryResult<Store> {
        self.require_store(ctx, store_id).await
    }

    /// Stores of the tenant the context may see, ordered by name.
    pub async fn list_stores(
        &self,
        ctx: &RequestContext,
        include_inactive: bool,
    ) -> InventoryResult<Vec<Store>> {
        let tenant = ctx.tenant_id.as_str();
        let stores = self
            .with_retry("list_stores", move |_| async move {
                Ok::<_, InventoryError>(self.db.stores().list(tenant, include_inactive).await?)
            })
            .await?;

        Ok(stores
            .into_iter()
            .filter(|store| ctx.can_access_store(&store.id))
            .collect())
    }

    pub async fn update_store(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        update: &StoreUpdate,
    ) -> InventoryResult<Store> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        self.require_store(ctx, store_id).await?;
        let tenant = ctx.tenant_id.as_str();

        let store = self
            .with_retry("update_store", move |_| async move {
                Ok::<_, InventoryError>(self.db.stores().update(tenant, store_id, update).await?)
            })
            .await?;

        self.audit(ctx, AuditAction::Update, "store", store_id, store_changes(update))
            .await?;

        debug!(store_id, "Store updated");
        Ok(store)
    }

    /// Soft-deletes a store. Reads of its stock and history keep working.
    pub async fn deactivate_store(&self, ctx: &RequestContext, store_id: &str) -> InventoryResult<()> {
        self.require_store(ctx, store_id).await?;
        let tenant = ctx.tenant_id.as_str();

        self.with_retry("deactivate_store", move |_| async move {
            Ok::<_, InventoryError>(self.db.stores().deactivate(tenant, store_id).await?)
        })
        .await?;

        self.audit(ctx, AuditAction::Deactivate, "store", store_id, Value::Null)
            .await?;

        info!(store_id, "Store deactivated");
        Ok(())
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Creates a product. The SKU must be unique within the tenant.
    pub async fn create_product(
        &self,
        ctx: &RequestContext,
        input: NewProduct,
    ) -> InventoryResult<Product> {
        validate_new_product(&input)?;
        let tenant = ctx.tenant_id.as_str();
        let input = &input;

        let product = self
            .with_retry("create_product", move |_| async move {
                Ok::<_, InventoryError>(self.db.products().insert(tenant, input).await?)
            })
            .await?;

        self.audit(
            ctx,
            AuditAction::Create,
            "product",
            &product.id,
            json!({
                "sku": product.sku,
                "name": product.name,
                "unit": product.unit,
                "low_stock_threshold": product.low_stock_threshold,
            }),
        )
        .await?;

        info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    pub async fn get_product(&self, ctx: &RequestContext, product_id: &str) -> InventoryResult<Product> {
        self.require_product(ctx, product_id).await
    }

    /// Products of the tenant ordered by SKU, optionally within one category.
    pub async fn list_products(
        &self,
        ctx: &RequestContext,
        category: Option<&str>,
        include_inactive: bool,
    ) -> InventoryResult<Vec<Product>> {
        let tenant = ctx.tenant_id.as_str();
        self.with_retry("list_products", move |_| async move {
            Ok::<_, InventoryError>(
                self.db
                    .products()
                    .list(tenant, category, include_inactive)
                    .await?,
            )
        })
        .await
    }

    /// Updates product attributes.
    ///
    /// A threshold change drops the product's cached alerts; the next write
    /// at each store raises them again against the new threshold.
    pub async fn update_product(
        &self,
        ctx: &RequestContext,
        product_id: &str,
        update: &ProductUpdate,
    ) -> InventoryResult<Product> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(Some(threshold)) = update.low_stock_threshold {
            validate_threshold(threshold)?;
        }
        self.require_product(ctx, product_id).await?;
        let tenant = ctx.tenant_id.as_str();

        let product = self
            .with_retry("update_product", move |_| async move {
                Ok::<_, InventoryError>(
                    self.db.products().update(tenant, product_id, update).await?,
                )
            })
            .await?;

        self.audit(ctx, AuditAction::Update, "product", product_id, product_changes(update))
            .await?;

        if update.low_stock_threshold.is_some() {
            self.drop_cached_alerts(ctx, product_id).await?;
        }

        debug!(product_id, "Product updated");
        Ok(product)
    }

    /// Soft-deletes a product. Its history and current stock stay readable.
    pub async fn deactivate_product(&self, ctx: &RequestContext, product_id: &str) -> InventoryResult<()> {
        self.require_product(ctx, product_id).await?;
        let tenant = ctx.tenant_id.as_str();

        self.with_retry("deactivate_product", move |_| async move {
            Ok::<_, InventoryError>(self.db.products().deactivate(tenant, product_id).await?)
        })
        .await?;

        self.audit(ctx, AuditAction::Deactivate, "product", product_id, Value::Null)
            .await?;
        self.drop_cached_alerts(ctx, product_id).await?;

        info!(product_id, "Product deactivated");
        Ok(())
    }

    // =========================================================================
    // Audit Log
    // =========================================================================

    /// Audit entries of the tenant, newest first.
    pub async fn audit_log(
        &self,
        ctx: &RequestContext,
        filter: &AuditFilter,
    ) -> InventoryResult<Vec<AuditLog>> {
        validate_limit(filter.limit)?;
        if let Some(range) = &filter.range {
            validate_range(range)?;
        }
        let tenant = ctx.tenant_id.as_str();

        self.with_retry("audit_log", move |_| async move {
            Ok::<_, InventoryError>(self.db.audit().list(tenant, filter).await?)
        })
        .await
    }

    async fn audit(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        resource_type: &'static str,
        resource_id: &str,
        details: Value,
    ) -> InventoryResult<()> {
        let tenant = ctx.tenant_id.as_str();
        let actor = ctx.actor.as_deref();
        let details = &details;

        self.with_retry("record_audit", move |_| async move {
            let mut entry = NewAuditEntry::new(action, resource_type, resource_id);
            if !details.is_null() {
                entry = entry.details(details.clone());
            }
            self.db.audit().record(tenant, actor, entry).await?;
            Ok::<_, InventoryError>(())
        })
        .await
    }

    async fn drop_cached_alerts(&self, ctx: &RequestContext, product_id: &str) -> InventoryResult<()> {
        let tenant = ctx.tenant_id.as_str();
        let stores = self
            .with_retry("list_stores", move |_| async move {
                Ok::<_, InventoryError>(self.db.stores().list(tenant, true).await?)
            })
            .await?;

        for store in stores {
            self.cache
                .delete(&cache_keys::low_stock_alert(tenant, &store.id, product_id))
                .await;
        }
        Ok(())
    }
}

fn store_changes(update: &StoreUpdate) -> Value {
    let mut changes = serde_json::Map::new();
    if let Some(name) = &update.name {
        changes.insert("name".into(), json!(name));
    }
    if let Some(location) = &update.location {
        changes.insert("location".into(), json!(location));
    }
    if let Some(address) = &update.address {
        changes.insert("address".into(), json!(address));
    }
    if let Some(allow_negative) = update.allow_negative_stock {
        changes.insert("allow_negative_stock".into(), json!(allow_negative));
    }
    Value::Object(changes)
}

fn product_changes(update: &ProductUpdate) -> Value {
    let mut changes = serde_json::Map::new();
    if let Some(name) = &update.name {
        changes.insert("name".into(), json!(name));
    }
    if let Some(unit) = &update.unit {
        changes.insert("unit".into(), json!(unit));
    }
    if let Some(category) = &update.category {
        changes.insert("category".into(), json!(category));
    }
    if let Some(threshold) = update.low_stock_threshold {
        changes.insert("low_stock_threshold".into(), json!(threshold));
    }
    Value::Object(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::tests::{ctx, engine, seed, TENANT};
    use stockroom_core::{LowStockAlert, MovementType, NewMovement, ValidationError};

    #[tokio::test]
    async fn test_store_lifecycle_is_audited() {
        let engine = engine().await;
        let (store, _) = seed(&engine).await;

        let updated = engine
            .update_store(
                &ctx(),
                &store.id,
                &StoreUpdate {
                    location: Some("Downtown".into()),
                    allow_negative_stock: Some(Some(true)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.location.as_deref(), Some("Downtown"));
        assert_eq!(updated.allow_negative_stock, Some(true));

        engine.deactivate_store(&ctx(), &store.id).await.unwrap();
        assert!(engine.list_stores(&ctx(), false).await.unwrap().is_empty());
        assert!(!engine.get_store(&ctx(), &store.id).await.unwrap().is_active);

        let entries = engine
            .audit_log(
                &ctx(),
                &AuditFilter {
                    resource_type: Some("store".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Deactivate, AuditAction::Update, AuditAction::Create]
        );
        let details: Value = serde_json::from_str(entries[1].details.as_deref().unwrap()).unwrap();
        assert_eq!(details["location"], "Downtown");
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_rejected() {
        let engine = engine().await;
        seed(&engine).await;

        let err = engine
            .create_product(&ctx(), NewProduct::new("BEV-001", "Another cola"))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let engine = engine().await;
        let err = engine
            .create_store(&ctx(), NewStore::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));

        let (_, product) = seed(&engine).await;
        let err = engine
            .update_product(
                &ctx(),
                &product.id,
                &ProductUpdate {
                    low_stock_threshold: Some(Some(-1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_store_listing_respects_scope() {
        let engine = engine().await;
        let (main, _) = seed(&engine).await;
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

        let scoped = RequestContext::new(TENANT).with_allowed_stores([depot.id.clone()]);
        let visible = engine.list_stores(&scoped, false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, depot.id);

        let err = engine.get_store(&scoped, &main.id).await.unwrap_err();
        assert!(matches!(err, InventoryError::NotFound { .. }));

        let other_tenant = RequestContext::new("tenant-2");
        assert!(engine.list_stores(&other_tenant, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_change_drops_cached_alert() {
        let engine = engine().await;
        let (store, product) = seed(&engine).await;
        let lower = ProductUpdate {
            low_stock_threshold: Some(Some(5)),
            ..Default::default()
        };
        engine.update_product(&ctx(), &product.id, &lower).await.unwrap();

        let outcome = engine
            .append(&ctx(), NewMovement::new(&store.id, &product.id, MovementType::StockIn, 3))
            .await
            .unwrap();
        assert!(outcome.low_stock);

        let key = cache_keys::low_stock_alert(TENANT, &store.id, &product.id);
        assert!(engine.cache.get_json::<LowStockAlert>(&key).await.is_some());

        let cleared = ProductUpdate {
            low_stock_threshold: Some(None),
            ..Default::default()
        };
        engine.update_product(&ctx(), &product.id, &cleared).await.unwrap();
        assert!(engine.cache.get_json::<LowStockAlert>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_audit_log_rejects_bad_limit() {
        let engine = engine().await;
        let err = engine
            .audit_log(
                &ctx(),
                &AuditFilter {
                    limit: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Validation(ValidationError::OutOfRange { .. })
        ));
    }
}
