//! Penalty ledger and account restriction endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{Penalty, PenaltySummary, User},
    AppState,
};

use super::AuthenticatedUser;

/// Penalties and outstanding balance of a user
#[utoipa::path(
    get,
    path = "/users/{id}/penalties",
    tag = "penalties",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Penalty summary", body = PenaltySummary),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn user_penalties(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<PenaltySummary>> {
    let summary = state.services.ledger.summary(&user.actor(), user_id).await?;
    Ok(Json(summary))
}

/// Record payment of a penalty
#[utoipa::path(
    post,
    path = "/penalties/{id}/settle",
    tag = "penalties",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Penalty ID")),
    responses(
        (status = 200, description = "Penalty settled", body = Penalty),
        (status = 400, description = "Already paid", body = crate::error::ErrorResponse),
        (status = 404, description = "Penalty not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn settle_penalty(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Penalty>> {
    let penalty = state.services.ledger.settle(&user.actor(), id).await?;
    Ok(Json(penalty))
}

/// Record payment of everything owed on one return
#[utoipa::path(
    post,
    path = "/reservations/{id}/settle",
    tag = "penalties",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Penalties settled by this call", body = Vec<Penalty>),
        (status = 404, description = "No return recorded", body = crate::error::ErrorResponse)
    )
)]
pub async fn settle_return(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<Penalty>>> {
    let settled = state.services.ledger.settle_return(&user.actor(), id).await?;
    Ok(Json(settled))
}

/// Remove a penalty (administrators only)
#[utoipa::path(
    delete,
    path = "/penalties/{id}",
    tag = "penalties",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Penalty ID")),
    responses(
        (status = 200, description = "Penalty removed", body = Penalty),
        (status = 403, description = "Administrators only", body = crate::error::ErrorResponse),
        (status = 404, description = "Penalty not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn remove_penalty(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Penalty>> {
    let removed = state.services.ledger.remove(&user.actor(), id).await?;
    Ok(Json(removed))
}

/// Lift an account restriction (administrators only)
#[utoipa::path(
    post,
    path = "/users/{id}/unrestrict",
    tag = "penalties",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Restriction lifted", body = User),
        (status = 400, description = "User is not restricted", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrators only", body = crate::error::ErrorResponse)
    )
)]
pub async fn unrestrict_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    let unrestricted = state.services.ledger.unrestrict(&user.actor(), id).await?;
    Ok(Json(unrestricted))
}
