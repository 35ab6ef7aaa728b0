//! Users repository (the lending engine's view of the user directory)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use super::UsersStore;
use crate::{
    error::{AppError, AppResult},
    models::{user::UserRow, User},
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsersStore for UsersRepository {
    async fn get(&self, id: i32) -> AppResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, login, firstname, lastname, email, role, is_restricted,
                   restriction_reason, restricted_at, has_pending_penalties,
                   total_pending_penalties
            FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn restrict(&self, id: i32, reason: &str, at: DateTime<Utc>) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_restricted = TRUE, restriction_reason = $2, restricted_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(())
    }

    async fn unrestrict(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_restricted = FALSE, restriction_reason = NULL, restricted_at = NULL
            WHERE id = $1 AND is_restricted
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_penalty_summary(&self, id: i32, total: Decimal) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET total_pending_penalties = $2, has_pending_penalties = $2 > 0
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(total)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
