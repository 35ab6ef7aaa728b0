//! Return endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{ReturnRequest, ReturnTransaction},
    services::returns::ReturnOutcome,
    AppState,
};

use super::AuthenticatedUser;

/// Close a borrowed reservation and assess penalties
#[utoipa::path(
    post,
    path = "/reservations/{id}/return",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Return recorded; check partial_success for follow-up failures", body = ReturnOutcome),
        (status = 400, description = "Invalid condition", body = crate::error::ErrorResponse),
        (status = 409, description = "Reservation is not borrowed", body = crate::error::ErrorResponse)
    )
)]
pub async fn process_return(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<ReturnRequest>,
) -> AppResult<Json<ReturnOutcome>> {
    let condition = request.book_condition()?;
    let outcome = state
        .services
        .returns
        .process_return(&user.actor(), id, condition)
        .await?;
    Ok(Json(outcome))
}

/// Get the return transaction of a reservation
#[utoipa::path(
    get,
    path = "/returns/{reservation_id}",
    tag = "returns",
    security(("bearer_auth" = [])),
    params(("reservation_id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Return transaction", body = ReturnTransaction),
        (status = 404, description = "No return recorded", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_return(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(reservation_id): Path<i32>,
) -> AppResult<Json<ReturnTransaction>> {
    let transaction = state
        .services
        .returns
        .get_return(&user.actor(), reservation_id)
        .await?;
    Ok(Json(transaction))
}
