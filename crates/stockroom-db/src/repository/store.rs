//! # Store Repository
//!
//! Database operations for stores. Every lookup is scoped by tenant, so a
//! store belonging to another tenant is indistinguishable from a missing one.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockroom_core::{NewStore, Store, StoreUpdate};

const STORE_COLUMNS: &str = "id, tenant_id, name, location, address, allow_negative_stock, \
                             is_active, created_at, updated_at";

/// Repository for store database operations.
#[derive(Debug, Clone)]
pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    /// Creates a new StoreRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StoreRepository { pool }
    }

    /// Gets a store by id within a tenant.
    pub async fn get(&self, tenant_id: &str, id: &str) -> DbResult<Option<Store>> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores WHERE tenant_id = ?1 AND id = ?2");

        let store = sqlx::query_as::<_, Store>(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(store)
    }

    /// Lists stores of a tenant ordered by name.
    pub async fn list(&self, tenant_id: &str, include_inactive: bool) -> DbResult<Vec<Store>> {
        let sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores \
             WHERE tenant_id = ?1 AND (?2 OR is_active = 1) \
             ORDER BY name, id"
        );

        let stores = sqlx::query_as::<_, Store>(&sql)
            .bind(tenant_id)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;

        Ok(stores)
    }

    /// Inserts a new store and returns it.
    pub async fn insert(&self, tenant_id: &str, input: &NewStore) -> DbResult<Store> {
        let now = Utc::now();
        let store = Store {
            id: generate_store_id(),
            tenant_id: tenant_id.to_string(),
            name: input.name.trim().to_string(),
            location: input.location.clone(),
            address: input.address.clone(),
            allow_negative_stock: input.allow_negative_stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(store_id = %store.id, name = %store.name, "Inserting store");

        sqlx::query(
            r#"
            INSERT INTO stores (
                id, tenant_id, name, location, address,
                allow_negative_stock, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&store.id)
        .bind(&store.tenant_id)
        .bind(&store.name)
        .bind(&store.location)
        .bind(&store.address)
        .bind(store.allow_negative_stock)
        .bind(store.is_active)
        .bind(store.created_at)
        .bind(store.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(store)
    }

    /// Applies a partial update and returns the updated store.
    pub async fn update(&self, tenant_id: &str, id: &str, update: &StoreUpdate) -> DbResult<Store> {
        let mut store = self
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Store", id))?;

        if let Some(name) = &update.name {
            store.name = name.trim().to_string();
        }
        if let Some(location) = &update.location {
            store.location = Some(location.clone());
        }
        if let Some(address) = &update.address {
            store.address = Some(address.clone());
        }
        if let Some(allow_negative) = update.allow_negative_stock {
            store.allow_negative_stock = allow_negative;
        }
        store.updated_at = Utc::now();

        debug!(store_id = %id, "Updating store");

        sqlx::query(
            r#"
            UPDATE stores SET
                name = ?3,
                location = ?4,
                address = ?5,
                allow_negative_stock = ?6,
                updated_at = ?7
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(&store.name)
        .bind(&store.location)
        .bind(&store.address)
        .bind(store.allow_negative_stock)
        .bind(store.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(store)
    }

    /// Marks a store inactive. Its ledger history stays intact.
    pub async fn deactivate(&self, tenant_id: &str, id: &str) -> DbResult<()> {
        debug!(store_id = %id, "Deactivating store");

        let result = sqlx::query(
            "UPDATE stores SET is_active = 0, updated_at = ?3 WHERE tenant_id = ?1 AND id = ?2",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Store", id));
        }

        Ok(())
    }
}

/// Generates a new store ID.
pub fn generate_store_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn repo() -> StoreRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stores()
    }

    fn downtown() -> NewStore {
        NewStore {
            name: "Downtown".to_string(),
            location: Some("Main St".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_is_tenant_scoped() {
        let repo = repo().await;
        let store = repo.insert("t1", &downtown()).await.unwrap();

        let found = repo.get("t1", &store.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Downtown");
        assert!(found.is_active);
        assert!(found.allow_negative_stock.is_none());

        assert!(repo.get("t2", &store.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_deactivate() {
        let repo = repo().await;
        let store = repo.insert("t1", &downtown()).await.unwrap();

        let updated = repo
            .update(
                "t1",
                &store.id,
                &StoreUpdate {
                    name: Some("Uptown".to_string()),
                    allow_negative_stock: Some(Some(true)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Uptown");
        assert_eq!(updated.allow_negative_stock, Some(true));
        assert_eq!(updated.location.as_deref(), Some("Main St"));

        repo.deactivate("t1", &store.id).await.unwrap();
        assert!(repo.list("t1", false).await.unwrap().is_empty());
        assert_eq!(repo.list("t1", true).await.unwrap().len(), 1);

        assert!(matches!(
            repo.deactivate("t1", "missing").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
