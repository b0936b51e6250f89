//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Tenant-scoped lookup by id or SKU
//! - Attribute updates (name, unit, category, low-stock threshold)
//! - Soft delete
//!
//! The id never changes once issued; the ledger references it forever.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockroom_core::{NewProduct, Product, ProductUpdate};

const PRODUCT_COLUMNS: &str = "id, tenant_id, sku, name, unit, category, low_stock_threshold, \
                               is_active, created_at, updated_at";

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo.get_by_sku(tenant_id, "BEANS-1KG").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by id within a tenant.
    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = ?1 AND id = ?2");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by SKU within a tenant.
    pub async fn get_by_sku(&self, tenant_id: &str, sku: &str) -> DbResult<Option<Product>> {
        debug!(sku = %sku, "Looking up product by SKU");

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = ?1 AND sku = ?2");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(tenant_id)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Lists products of a tenant, optionally filtered by category.
    pub async fn list(
        &self,
        tenant_id: &str,
        category: Option<&str>,
        include_inactive: bool,
    ) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE tenant_id = ?1 \
               AND (?2 IS NULL OR category = ?2) \
               AND (?3 OR is_active = 1) \
             ORDER BY sku"
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(tenant_id)
            .bind(category)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists for the tenant
    pub async fn insert(&self, tenant_id: &str, input: &NewProduct) -> DbResult<Product> {
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            tenant_id: tenant_id.to_string(),
            sku: input.sku.trim().to_string(),
            name: input.name.trim().to_string(),
            unit: input.unit.trim().to_string(),
            category: input.category.clone(),
            low_stock_threshold: input.low_stock_threshold,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %product.sku, "Inserting product");

        let result = sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, sku, name, unit, category,
                low_stock_threshold, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.unit)
        .bind(&product.category)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(product),
            Err(e) => match DbError::from(e) {
                DbError::UniqueViolation { .. } => Err(DbError::duplicate("sku", &product.sku)),
                other => Err(other),
            },
        }
    }

    /// Applies a partial update and returns the updated product.
    pub async fn update(
        &self,
        tenant_id: &str,
        id: &str,
        update: &ProductUpdate,
    ) -> DbResult<Product> {
        let mut product = self
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        if let Some(name) = &update.name {
            product.name = name.trim().to_string();
        }
        if let Some(unit) = &update.unit {
            product.unit = unit.trim().to_string();
        }
        if let Some(category) = &update.category {
            product.category = Some(category.clone());
        }
        if let Some(threshold) = update.low_stock_threshold {
            product.low_stock_threshold = threshold;
        }
        product.updated_at = Utc::now();

        debug!(product_id = %id, "Updating product");

        sqlx::query(
            r#"
            UPDATE products SET
                name = ?3,
                unit = ?4,
                category = ?5,
                low_stock_threshold = ?6,
                updated_at = ?7
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(&product.name)
        .bind(&product.unit)
        .bind(&product.category)
        .bind(product.low_stock_threshold)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Soft-deletes a product. Historical movements still reference it.
    pub async fn deactivate(&self, tenant_id: &str, id: &str) -> DbResult<()> {
        debug!(product_id = %id, "Deactivating product");

        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?3 WHERE tenant_id = ?1 AND id = ?2",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products of a tenant (for diagnostics).
    pub async fn count(&self, tenant_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE tenant_id = ?1 AND is_active = 1")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

/// Generates a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn repo() -> ProductRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products()
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let repo = repo().await;
        let mut input = NewProduct::new("BEANS-1KG", "Coffee beans 1kg");
        input.category = Some("coffee".to_string());
        let product = repo.insert("t1", &input).await.unwrap();

        let by_id = repo.get("t1", &product.id).await.unwrap().unwrap();
        assert_eq!(by_id.sku, "BEANS-1KG");
        assert_eq!(by_id.unit, "each");

        let by_sku = repo.get_by_sku("t1", "BEANS-1KG").await.unwrap().unwrap();
        assert_eq!(by_sku.id, product.id);

        assert!(repo.get("other-tenant", &product.id).await.unwrap().is_none());
        assert_eq!(repo.list("t1", Some("coffee"), false).await.unwrap().len(), 1);
        assert!(repo.list("t1", Some("tea"), false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_sku_per_tenant() {
        let repo = repo().await;
        repo.insert("t1", &NewProduct::new("SKU-1", "One")).await.unwrap();

        let dup = repo.insert("t1", &NewProduct::new("SKU-1", "Again")).await;
        assert!(matches!(dup, Err(DbError::UniqueViolation { .. })));

        // Same SKU is fine for another tenant.
        assert!(repo.insert("t2", &NewProduct::new("SKU-1", "Other")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_threshold_and_deactivate() {
        let repo = repo().await;
        let product = repo.insert("t1", &NewProduct::new("SKU-2", "Two")).await.unwrap();

        let updated = repo
            .update(
                "t1",
                &product.id,
                &ProductUpdate {
                    low_stock_threshold: Some(Some(5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.low_stock_threshold, Some(5));

        repo.deactivate("t1", &product.id).await.unwrap();
        assert_eq!(repo.count("t1").await.unwrap(), 0);
        assert!(!repo.get("t1", &product.id).await.unwrap().unwrap().is_active);
    }
}
