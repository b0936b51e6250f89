//! # Audit Repository
//!
//! Append-only audit trail, kept apart from the movement ledger.
//!
//! Removals are audited inside the append transaction, so a rolled-back
//! removal leaves no audit entry behind.

use chrono::Utc;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use stockroom_core::{AuditAction, AuditFilter, AuditLog};

const AUDIT_COLUMNS: &str =
    "id, tenant_id, actor, action, resource_type, resource_id, details, created_at";

/// An audit entry about to be written.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub resource_type: &'static str,
    pub resource_id: String,
    pub details: Option<Value>,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, resource_type: &'static str, resource_id: impl Into<String>) -> Self {
        NewAuditEntry {
            action,
            resource_type,
            resource_id: resource_id.into(),
            details: None,
        }
    }

    /// Attaches a JSON document describing the change.
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Repository for the audit log.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Writes an entry on its own connection.
    pub async fn record(
        &self,
        tenant_id: &str,
        actor: Option<&str>,
        entry: NewAuditEntry,
    ) -> DbResult<AuditLog> {
        let mut conn = self.pool.acquire().await?;
        Self::record_on(&mut conn, tenant_id, actor, entry).await
    }

    /// Writes an entry on `conn` (typically inside a transaction).
    pub async fn record_on(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        actor: Option<&str>,
        entry: NewAuditEntry,
    ) -> DbResult<AuditLog> {
        let log = AuditLog {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            actor: actor.map(str::to_string),
            action: entry.action,
            resource_type: entry.resource_type.to_string(),
            resource_id: entry.resource_id,
            details: entry.details.map(|d| d.to_string()),
            created_at: Utc::now(),
        };

        debug!(
            action = %log.action,
            resource_type = %log.resource_type,
            resource_id = %log.resource_id,
            "Recording audit entry"
        );

        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, tenant_id, actor, action, resource_type, resource_id, details, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&log.id)
        .bind(&log.tenant_id)
        .bind(&log.actor)
        .bind(log.action)
        .bind(&log.resource_type)
        .bind(&log.resource_id)
        .bind(&log.details)
        .bind(log.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(log)
    }

    /// Lists entries newest first.
    pub async fn list(&self, tenant_id: &str, filter: &AuditFilter) -> DbResult<Vec<AuditLog>> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE tenant_id = ?1 \
               AND (?2 IS NULL OR resource_type = ?2) \
               AND (?3 IS NULL OR resource_id = ?3) \
               AND (?4 IS NULL OR action = ?4) \
               AND (?5 IS NULL OR actor = ?5) \
               AND (?6 IS NULL OR created_at >= ?6) \
               AND (?7 IS NULL OR created_at < ?7) \
             ORDER BY created_at DESC, rowid DESC \
             LIMIT ?8 OFFSET ?9"
        );

        let entries = sqlx::query_as::<_, AuditLog>(&sql)
            .bind(tenant_id)
            .bind(filter.resource_type.as_deref())
            .bind(filter.resource_id.as_deref())
            .bind(filter.action)
            .bind(filter.actor.as_deref())
            .bind(filter.range.map(|r| r.start))
            .bind(filter.range.map(|r| r.end))
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use serde_json::json;

    #[tokio::test]
    async fn test_record_and_filter() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let audit = db.audit();

        audit
            .record("t1", Some("alice"), NewAuditEntry::new(AuditAction::Create, "store", "s1"))
            .await
            .unwrap();
        let removal = audit
            .record(
                "t1",
                Some("bob"),
                NewAuditEntry::new(AuditAction::Removal, "stock_movement", "m1")
                    .details(json!({ "quantity": 4, "notes": "broken" })),
            )
            .await
            .unwrap();

        let all = audit.list("t1", &AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, removal.id, "newest first");

        let removals = audit
            .list(
                "t1",
                &AuditFilter {
                    action: Some(AuditAction::Removal),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(removals.len(), 1);
        let details: Value = serde_json::from_str(removals[0].details.as_deref().unwrap()).unwrap();
        assert_eq!(details["quantity"], 4);

        let by_actor = audit
            .list(
                "t1",
                &AuditFilter {
                    actor: Some("alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_actor.len(), 1);

        assert!(audit.list("t2", &AuditFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_log_is_append_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.audit()
            .record("t1", None, NewAuditEntry::new(AuditAction::Repair, "current_stock", "s/p"))
            .await
            .unwrap();

        assert!(sqlx::query("DELETE FROM audit_log").execute(db.pool()).await.is_err());
    }
}
