//! Penalties repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use super::PenaltiesStore;
use crate::{
    error::AppResult,
    models::{penalty::PenaltyRow, Penalty},
};

#[derive(Clone)]
pub struct PenaltiesRepository {
    pool: Pool<Postgres>,
}

impl PenaltiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PenaltiesStore for PenaltiesRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Penalty>> {
        sqlx::query_as::<_, PenaltyRow>("SELECT * FROM penalties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Penalty::try_from)
            .transpose()
    }

    async fn list_for_user(&self, user_id: i32, unpaid_only: bool) -> AppResult<Vec<Penalty>> {
        sqlx::query_as::<_, PenaltyRow>(
            r#"
            SELECT * FROM penalties
            WHERE user_id = $1 AND (NOT $2 OR NOT is_paid)
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .bind(unpaid_only)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Penalty::try_from)
        .collect()
    }

    async fn list_for_reservation(&self, reservation_id: i32) -> AppResult<Vec<Penalty>> {
        sqlx::query_as::<_, PenaltyRow>(
            "SELECT * FROM penalties WHERE reservation_id = $1 ORDER BY id",
        )
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Penalty::try_from)
        .collect()
    }

    async fn outstanding_total(&self, user_id: i32) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM penalties WHERE user_id = $1 AND NOT is_paid",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn mark_paid(&self, id: i32, at: DateTime<Utc>) -> AppResult<Option<Penalty>> {
        sqlx::query_as::<_, PenaltyRow>(
            r#"
            UPDATE penalties SET is_paid = TRUE, paid_at = $2
            WHERE id = $1 AND NOT is_paid
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .map(Penalty::try_from)
        .transpose()
    }

    async fn remove(&self, id: i32) -> AppResult<Option<Penalty>> {
        sqlx::query_as::<_, PenaltyRow>("DELETE FROM penalties WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Penalty::try_from)
            .transpose()
    }
}
