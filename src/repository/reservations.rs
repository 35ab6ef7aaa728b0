//! Reservations repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};

use super::{ClosedLoan, ReservationsStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        enums::ReservationStatus,
        penalty::PenaltyRow,
        reservation::ReservationRow,
        return_transaction::ReturnTransactionRow,
        NewPenalty, NewReservation, NewReturnTransaction, Penalty, Reservation, ReservationFilter,
        ReservationUpdate, ReturnTransaction, StatusGuard,
    },
};

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationsStore for ReservationsRepository {
    async fn insert(&self, r: NewReservation) -> AppResult<Reservation> {
        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            INSERT INTO reservations (
                user_id, book_id, status, reservation_date, approval_date,
                borrow_date, due_date, copy_id, copy_label, is_walk_in
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(r.user_id)
        .bind(r.book_id)
        .bind(r.status.as_str())
        .bind(r.reservation_date)
        .bind(r.approval_date)
        .bind(r.borrow_date)
        .bind(r.due_date)
        .bind(r.copy_id)
        .bind(&r.copy_label)
        .bind(r.is_walk_in)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // reservations_active_hold_idx lost a race with a concurrent create
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Eligibility(crate::error::EligibilityError::DuplicateHold)
            }
            other => AppError::Database(other),
        })?;

        row.try_into()
    }

    async fn get(&self, id: i32) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, ReservationRow>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Reservation::try_from)
            .transpose()
    }

    async fn list(&self, filter: &ReservationFilter) -> AppResult<Vec<Reservation>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM reservations WHERE TRUE");

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(flag) = filter.renewal_requested {
            query.push(" AND renewal_requested = ").push_bind(flag);
        }
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(cutoff) = filter.due_before {
            query.push(" AND due_date < ").push_bind(cutoff);
        }
        query.push(" ORDER BY reservation_date, id");

        query
            .build_query_as::<ReservationRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Reservation::try_from)
            .collect()
    }

    async fn has_active_hold(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND book_id = $2
                  AND status IN ('pending', 'approved', 'borrowed')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn transition(
        &self,
        id: i32,
        guard: StatusGuard,
        update: ReservationUpdate,
    ) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations SET
                status = $3,
                approval_date = COALESCE($4, approval_date),
                borrow_date = COALESCE($5, borrow_date),
                due_date = COALESCE($6, due_date),
                return_date = COALESCE($7, return_date),
                copy_id = COALESCE($8, copy_id),
                copy_label = COALESCE($9, copy_label),
                renewal_requested = COALESCE($10, renewal_requested),
                renewal_count = renewal_count + $11,
                cancellation_reason = COALESCE($12, cancellation_reason)
            WHERE id = $1
              AND status = $2
              AND ($13::BOOLEAN IS NULL OR renewal_requested = $13)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(guard.status.as_str())
        .bind(update.status.as_str())
        .bind(update.approval_date)
        .bind(update.borrow_date)
        .bind(update.due_date)
        .bind(update.return_date)
        .bind(update.copy_id)
        .bind(&update.copy_label)
        .bind(update.renewal_requested)
        .bind(if update.count_renewal { 1i16 } else { 0i16 })
        .bind(&update.cancellation_reason)
        .bind(guard.renewal_requested)
        .fetch_optional(&self.pool)
        .await?
        .map(Reservation::try_from)
        .transpose()
    }

    async fn cancel_expired(
        &self,
        approved_before: DateTime<Utc>,
        to: ReservationStatus,
        reason: &str,
    ) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations
            SET status = $1, cancellation_reason = $2, pickup_expired = TRUE
            WHERE status = $3 AND approval_date < $4
            RETURNING *
            "#,
        )
        .bind(to.as_str())
        .bind(reason)
        .bind(ReservationStatus::Approved.as_str())
        .bind(approved_before)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Reservation::try_from)
        .collect()
    }

    async fn close_loan(
        &self,
        id: i32,
        to: ReservationStatus,
        t: NewReturnTransaction,
        penalties: Vec<NewPenalty>,
    ) -> AppResult<Option<ClosedLoan>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations
            SET status = $2, return_date = $3, renewal_requested = FALSE
            WHERE id = $1 AND status = $4
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(t.return_date)
        .bind(ReservationStatus::Borrowed.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let reservation = Reservation::try_from(row)?;

        let transaction: ReturnTransaction = sqlx::query_as::<_, ReturnTransactionRow>(
            r#"
            INSERT INTO return_transactions (
                reservation_id, book_id, user_id, borrow_date, due_date, return_date,
                minutes_late, late_fee, condition, condition_penalty, total_penalty,
                payment_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(t.reservation_id)
        .bind(t.book_id)
        .bind(t.user_id)
        .bind(t.borrow_date)
        .bind(t.due_date)
        .bind(t.return_date)
        .bind(t.minutes_late)
        .bind(t.late_fee)
        .bind(t.condition.as_str())
        .bind(t.condition_penalty)
        .bind(t.total_penalty)
        .bind(t.payment_status().as_str())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let mut created = Vec::with_capacity(penalties.len());
        for p in penalties {
            let penalty: Penalty = sqlx::query_as::<_, PenaltyRow>(
                r#"
                INSERT INTO penalties (user_id, reservation_id, book_id, kind, amount, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(p.user_id)
            .bind(p.reservation_id)
            .bind(p.book_id)
            .bind(p.kind.as_str())
            .bind(p.amount)
            .bind(p.created_at)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;
            created.push(penalty);
        }

        tx.commit().await?;

        Ok(Some(ClosedLoan {
            reservation,
            transaction,
            penalties: created,
        }))
    }
}
