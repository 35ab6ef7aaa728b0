//! Walk-in borrowing endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{DirectBorrowRequest, EligibilityQuery},
    services::eligibility::EligibilityReport,
    AppState,
};

use super::{reservations::ReservationResponse, AuthenticatedUser};

/// Check whether a user may borrow a book right now
#[utoipa::path(
    get,
    path = "/borrowing/eligibility",
    tag = "borrowing",
    security(("bearer_auth" = [])),
    params(EligibilityQuery),
    responses(
        (status = 200, description = "Eligibility report", body = EligibilityReport),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn check_eligibility(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<EligibilityQuery>,
) -> AppResult<Json<EligibilityReport>> {
    query.validate()?;
    let report = state
        .services
        .borrowing
        .check_eligibility(&user.actor(), query.user_id, query.book_id)
        .await?;
    Ok(Json(report))
}

/// Check a book out at the desk without a reservation
#[utoipa::path(
    post,
    path = "/borrowing/direct",
    tag = "borrowing",
    security(("bearer_auth" = [])),
    request_body = DirectBorrowRequest,
    responses(
        (status = 201, description = "Book checked out", body = ReservationResponse),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse),
        (status = 422, description = "Borrower not eligible", body = crate::error::ErrorResponse)
    )
)]
pub async fn direct_borrow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<DirectBorrowRequest>,
) -> AppResult<(StatusCode, Json<ReservationResponse>)> {
    request.validate()?;
    let reservation = state
        .services
        .borrowing
        .process_direct_borrowing(&user.actor(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(ReservationResponse::new(reservation, &state))))
}
