//! Reservation lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{CancelReservation, CreateReservation, Reservation, ReservationQuery},
    AppState,
};

use super::AuthenticatedUser;

/// Reservation with fields derived from the current time
#[derive(Serialize, ToSchema)]
pub struct ReservationResponse {
    #[serde(flatten)]
    pub reservation: Reservation,
    /// Borrowed and past its due date
    pub is_overdue: bool,
    /// For approved reservations: when the hold is released
    pub pickup_deadline: Option<DateTime<Utc>>,
}

impl ReservationResponse {
    pub fn new(reservation: Reservation, state: &AppState) -> Self {
        let now = state.services.clock.now();
        Self {
            is_overdue: reservation.is_overdue(now),
            pickup_deadline: reservation.pickup_deadline(state.config.lending.pickup_window()),
            reservation,
        }
    }
}

fn respond(state: &AppState, reservation: Reservation) -> Json<ReservationResponse> {
    Json(ReservationResponse::new(reservation, state))
}

fn respond_all(state: &AppState, reservations: Vec<Reservation>) -> Json<Vec<ReservationResponse>> {
    Json(
        reservations
            .into_iter()
            .map(|r| ReservationResponse::new(r, state))
            .collect(),
    )
}

#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    /// Approvals cancelled by this sweep
    pub cancelled: usize,
}

/// Reserve a book
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CreateReservation,
    responses(
        (status = 201, description = "Reservation created", body = ReservationResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 422, description = "Not eligible (restricted, unpaid penalties, no copies, duplicate hold)", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateReservation>,
) -> AppResult<(StatusCode, Json<ReservationResponse>)> {
    request.validate()?;
    let reservation = state.services.reservations.create(&user.actor(), request).await?;
    Ok((StatusCode::CREATED, respond(&state, reservation)))
}

/// List reservations for one staff view (expired approvals are swept first)
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Reservations in the requested view", body = Vec<ReservationResponse>),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_reservations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<Vec<ReservationResponse>>> {
    let reservations = state.services.reservations.list(&user.actor(), query.view).await?;
    Ok(respond_all(&state, reservations))
}

/// List the caller's own reservations
#[utoipa::path(
    get,
    path = "/reservations/mine",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's reservations", body = Vec<ReservationResponse>)
    )
)]
pub async fn list_my_reservations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ReservationResponse>>> {
    let reservations = state.services.reservations.list_mine(&user.actor()).await?;
    Ok(respond_all(&state, reservations))
}

/// Get reservation by ID
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation details", body = ReservationResponse),
        (status = 404, description = "Reservation not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationResponse>> {
    let reservation = state.services.reservations.get(&user.actor(), id).await?;
    Ok(respond(&state, reservation))
}

/// Approve a pending reservation and hold a copy
#[utoipa::path(
    post,
    path = "/reservations/{id}/approve",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation approved", body = ReservationResponse),
        (status = 409, description = "Reservation is not pending", body = crate::error::ErrorResponse),
        (status = 422, description = "No copies available", body = crate::error::ErrorResponse)
    )
)]
pub async fn approve_reservation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationResponse>> {
    let reservation = state.services.reservations.approve(&user.actor(), id).await?;
    Ok(respond(&state, reservation))
}

/// Reject a pending reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/reject",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation rejected", body = ReservationResponse),
        (status = 409, description = "Reservation is not pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn reject_reservation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationResponse>> {
    let reservation = state.services.reservations.reject(&user.actor(), id).await?;
    Ok(respond(&state, reservation))
}

/// Hand an approved reservation over to the borrower
#[utoipa::path(
    post,
    path = "/reservations/{id}/borrow",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Book checked out", body = ReservationResponse),
        (status = 409, description = "Not approved, or pickup window elapsed", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_borrowed(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationResponse>> {
    let reservation = state.services.reservations.mark_borrowed(&user.actor(), id).await?;
    Ok(respond(&state, reservation))
}

/// Cancel a reservation that is not yet returned, releasing any copy it holds
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    request_body(content = CancelReservation, description = "Optional cancellation reason"),
    responses(
        (status = 200, description = "Reservation cancelled", body = ReservationResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 409, description = "Reservation can no longer be cancelled", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<CancelReservation>>,
) -> AppResult<Json<ReservationResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let reservation = state
        .services
        .reservations
        .cancel(&user.actor(), id, request.reason)
        .await?;
    Ok(respond(&state, reservation))
}

/// Ask for a loan extension
#[utoipa::path(
    post,
    path = "/reservations/{id}/renewal",
    tag = "renewals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Renewal requested", body = ReservationResponse),
        (status = 409, description = "Not borrowed or already pending", body = crate::error::ErrorResponse),
        (status = 422, description = "Renewal limit reached", body = crate::error::ErrorResponse)
    )
)]
pub async fn request_renewal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationResponse>> {
    let reservation = state.services.reservations.request_renewal(&user.actor(), id).await?;
    Ok(respond(&state, reservation))
}

/// Approve a pending renewal; the due date moves by one loan period
#[utoipa::path(
    post,
    path = "/reservations/{id}/renewal/approve",
    tag = "renewals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Renewal approved", body = ReservationResponse),
        (status = 409, description = "No renewal pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn approve_renewal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationResponse>> {
    let reservation = state.services.reservations.approve_renewal(&user.actor(), id).await?;
    Ok(respond(&state, reservation))
}

/// Reject a pending renewal
#[utoipa::path(
    post,
    path = "/reservations/{id}/renewal/reject",
    tag = "renewals",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Renewal rejected", body = ReservationResponse),
        (status = 409, description = "No renewal pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn reject_renewal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationResponse>> {
    let reservation = state.services.reservations.reject_renewal(&user.actor(), id).await?;
    Ok(respond(&state, reservation))
}

/// Cancel approvals whose pickup window has elapsed
#[utoipa::path(
    post,
    path = "/sweep",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep finished", body = SweepResponse),
        (status = 403, description = "Staff only", body = crate::error::ErrorResponse)
    )
)]
pub async fn sweep_expired(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<SweepResponse>> {
    user.actor().require_staff()?;
    let cancelled = state.services.sweeper.sweep().await?;
    Ok(Json(SweepResponse { cancelled }))
}
