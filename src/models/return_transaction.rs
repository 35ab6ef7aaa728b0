//! Return transaction: immutable snapshot taken when a loan is closed

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::enums::{BookCondition, DamageSeverity, PaymentStatus};
use crate::error::AppError;

#[derive(Debug, Clone, FromRow)]
pub struct ReturnTransactionRow {
    id: i32,
    reservation_id: i32,
    book_id: i32,
    user_id: i32,
    borrow_date: Option<DateTime<Utc>>,
    due_date: Option<DateTime<Utc>>,
    return_date: DateTime<Utc>,
    minutes_late: i64,
    late_fee: Decimal,
    condition: String,
    condition_penalty: Decimal,
    total_penalty: Decimal,
    payment_status: String,
}

impl TryFrom<ReturnTransactionRow> for ReturnTransaction {
    type Error = AppError;

    fn try_from(row: ReturnTransactionRow) -> Result<Self, Self::Error> {
        Ok(ReturnTransaction {
            id: row.id,
            reservation_id: row.reservation_id,
            book_id: row.book_id,
            user_id: row.user_id,
            borrow_date: row.borrow_date,
            due_date: row.due_date,
            return_date: row.return_date,
            minutes_late: row.minutes_late,
            late_fee: row.late_fee,
            condition: row.condition.parse().map_err(AppError::Internal)?,
            condition_penalty: row.condition_penalty,
            total_penalty: row.total_penalty,
            payment_status: row.payment_status.parse().map_err(AppError::Internal)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnTransaction {
    pub id: i32,
    pub reservation_id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: DateTime<Utc>,
    pub minutes_late: i64,
    #[schema(value_type = String)]
    pub late_fee: Decimal,
    #[schema(value_type = String, example = "Damaged-Minor")]
    pub condition: BookCondition,
    #[schema(value_type = String)]
    pub condition_penalty: Decimal,
    #[schema(value_type = String)]
    pub total_penalty: Decimal,
    pub payment_status: PaymentStatus,
}

/// Everything computed for a return before it is persisted
#[derive(Debug, Clone)]
pub struct NewReturnTransaction {
    pub reservation_id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: DateTime<Utc>,
    pub minutes_late: i64,
    pub late_fee: Decimal,
    pub condition: BookCondition,
    pub condition_penalty: Decimal,
    pub total_penalty: Decimal,
}

impl NewReturnTransaction {
    pub fn payment_status(&self) -> PaymentStatus {
        if self.total_penalty > Decimal::ZERO {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Paid
        }
    }
}

/// Condition reported by staff at the desk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReturnedAs {
    Good,
    Damaged,
    Lost,
}

/// Process return request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnRequest {
    pub condition: ReturnedAs,
    /// Required when `condition` is `damaged`
    pub damage_severity: Option<DamageSeverity>,
}

impl ReturnRequest {
    pub fn book_condition(&self) -> Result<BookCondition, AppError> {
        match (self.condition, self.damage_severity) {
            (ReturnedAs::Good, None) => Ok(BookCondition::Good),
            (ReturnedAs::Lost, None) => Ok(BookCondition::Lost),
            (ReturnedAs::Damaged, Some(severity)) => Ok(BookCondition::Damaged(severity)),
            (ReturnedAs::Damaged, None) => Err(AppError::Validation(
                "damage_severity is required for damaged returns".to_string(),
            )),
            (_, Some(_)) => Err(AppError::Validation(
                "damage_severity only applies to damaged returns".to_string(),
            )),
        }
    }
}
