//! Audit log persisted to Postgres

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::effects::{AuditEntry, AuditSink};
use crate::error::AppResult;

#[derive(Clone)]
pub struct PgAuditSink {
    pool: Pool<Postgres>,
}

impl PgAuditSink {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, e: &AuditEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, occurred_at, actor_id, action, entity, success, detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(e.occurred_at)
        .bind(e.actor_id)
        .bind(&e.action)
        .bind(&e.entity)
        .bind(e.success)
        .bind(&e.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
