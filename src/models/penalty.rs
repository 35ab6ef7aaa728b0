//! Penalty ledger entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::enums::PenaltyKind;
use crate::error::AppError;

#[derive(Debug, Clone, FromRow)]
pub struct PenaltyRow {
    id: i32,
    user_id: i32,
    reservation_id: i32,
    book_id: i32,
    kind: String,
    amount: Decimal,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PenaltyRow> for Penalty {
    type Error = AppError;

    fn try_from(row: PenaltyRow) -> Result<Self, Self::Error> {
        Ok(Penalty {
            id: row.id,
            user_id: row.user_id,
            reservation_id: row.reservation_id,
            book_id: row.book_id,
            kind: row.kind.parse().map_err(AppError::Internal)?,
            amount: row.amount,
            is_paid: row.is_paid,
            paid_at: row.paid_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Penalty {
    pub id: i32,
    pub user_id: i32,
    pub reservation_id: i32,
    pub book_id: i32,
    pub kind: PenaltyKind,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPenalty {
    pub user_id: i32,
    pub reservation_id: i32,
    pub book_id: i32,
    pub kind: PenaltyKind,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Outstanding balance for one user
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PenaltySummary {
    pub user_id: i32,
    #[schema(value_type = String)]
    pub total_pending: Decimal,
    pub has_pending_penalties: bool,
    pub penalties: Vec<Penalty>,
}
