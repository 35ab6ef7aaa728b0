//! Return transactions repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::ReturnsStore;
use crate::{
    error::AppResult,
    models::{return_transaction::ReturnTransactionRow, PaymentStatus, ReturnTransaction},
};

#[derive(Clone)]
pub struct ReturnsRepository {
    pool: Pool<Postgres>,
}

impl ReturnsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReturnsStore for ReturnsRepository {
    async fn get_by_reservation(&self, reservation_id: i32) -> AppResult<Option<ReturnTransaction>> {
        sqlx::query_as::<_, ReturnTransactionRow>(
            "SELECT * FROM return_transactions WHERE reservation_id = $1",
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?
        .map(ReturnTransaction::try_from)
        .transpose()
    }

    async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<ReturnTransaction>> {
        sqlx::query_as::<_, ReturnTransactionRow>(
            "SELECT * FROM return_transactions WHERE user_id = $1 ORDER BY return_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ReturnTransaction::try_from)
        .collect()
    }

    async fn set_payment_status(&self, reservation_id: i32, status: PaymentStatus) -> AppResult<()> {
        sqlx::query("UPDATE return_transactions SET payment_status = $2 WHERE reservation_id = $1")
            .bind(reservation_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
