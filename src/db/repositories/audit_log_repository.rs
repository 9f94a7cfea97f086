use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::stores::AuditStore;
use crate::error::{AppError, AppResult};
use crate::models::{AuditLog, NewAuditLog};

#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for AuditLogRepository {
    async fn insert(&self, entry: &NewAuditLog) -> AppResult<AuditLog> {
        let log = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs
                (user_id, action, resource_type, resource_id, status, ip_address, user_agent, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, user_id, action, resource_type, resource_id, status, ip_address, user_agent, metadata, created_at
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.status)
        .bind(entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create audit log: {}", e)))?;

        Ok(log)
    }

    async fn list_for_resource(&self, resource_type: &str, resource_id: &str) -> AppResult<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT id, user_id, action, resource_type, resource_id, status, ip_address, user_agent, metadata, created_at
            FROM audit_logs
            WHERE resource_type = $1 AND resource_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(resource_type)
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to fetch audit logs: {}", e)))?;

        Ok(logs)
    }
}
