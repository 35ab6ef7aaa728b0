//! Error types for Libris server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::enums::ReservationStatus;

/// Machine-readable error codes returned to API callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    BadValue = 5,
    AccountRestricted = 10,
    UnpaidPenalties = 11,
    NoCopiesAvailable = 12,
    DuplicateHold = 13,
    RenewalLimitReached = 14,
    StateConflict = 20,
    PickupWindowElapsed = 21,
    NotOwner = 22,
}

/// Reasons a user may not reserve or borrow a book
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EligibilityError {
    #[error("Account is restricted: {reason}")]
    Restricted { reason: String },

    #[error("Account has unpaid penalties totalling {total}")]
    UnpaidPenalties { total: Decimal },

    #[error("No copies of this book are currently available")]
    NoCopiesAvailable,

    #[error("You already have an active reservation for this book")]
    DuplicateHold,

    #[error("Maximum renewals reached ({max})")]
    RenewalLimitReached { max: i16 },
}

impl EligibilityError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EligibilityError::Restricted { .. } => ErrorCode::AccountRestricted,
            EligibilityError::UnpaidPenalties { .. } => ErrorCode::UnpaidPenalties,
            EligibilityError::NoCopiesAvailable => ErrorCode::NoCopiesAvailable,
            EligibilityError::DuplicateHold => ErrorCode::DuplicateHold,
            EligibilityError::RenewalLimitReached { .. } => ErrorCode::RenewalLimitReached,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Eligibility(#[from] EligibilityError),

    #[error("Reservation {id} is {actual}, cannot {action}")]
    StateConflict {
        id: i32,
        action: &'static str,
        actual: ReservationStatus,
    },

    #[error("Pickup window for reservation {0} has elapsed")]
    PickupWindowElapsed(i32),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) => ErrorCode::NotAuthorized,
            AppError::Authorization(_) => ErrorCode::NotOwner,
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Eligibility(e) => e.code(),
            AppError::StateConflict { .. } => ErrorCode::StateConflict,
            AppError::PickupWindowElapsed(_) => ErrorCode::PickupWindowElapsed,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// Store outages and programming faults, as opposed to business-rule rejections
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Internal(_))
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Eligibility(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            AppError::StateConflict { .. } | AppError::PickupWindowElapsed(_) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_reasons_have_distinct_codes() {
        let codes = [
            EligibilityError::Restricted { reason: "x".into() }.code(),
            EligibilityError::UnpaidPenalties { total: Decimal::ONE }.code(),
            EligibilityError::NoCopiesAvailable.code(),
            EligibilityError::DuplicateHold.code(),
            EligibilityError::RenewalLimitReached { max: 2 }.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn only_store_faults_are_fatal() {
        assert!(AppError::Internal("boom".into()).is_fatal());
        assert!(!AppError::Eligibility(EligibilityError::DuplicateHold).is_fatal());
        assert!(!AppError::StateConflict {
            id: 1,
            action: "approve",
            actual: ReservationStatus::Borrowed,
        }
        .is_fatal());
    }

    #[test]
    fn eligibility_maps_to_unprocessable_entity() {
        let response = AppError::from(EligibilityError::NoCopiesAvailable).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
