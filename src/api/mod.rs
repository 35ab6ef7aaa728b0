//! API handlers for the Libris REST endpoints

pub mod borrowing;
pub mod health;
pub mod openapi;
pub mod penalties;
pub mod reservations;
pub mod returns;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    models::{Actor, UserClaims},
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

impl AuthenticatedUser {
    pub fn actor(&self) -> Actor {
        self.0.actor()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Reservations
        .route("/reservations", post(reservations::create_reservation))
        .route("/reservations", get(reservations::list_reservations))
        .route("/reservations/mine", get(reservations::list_my_reservations))
        .route("/reservations/:id", get(reservations::get_reservation))
        .route("/reservations/:id/approve", post(reservations::approve_reservation))
        .route("/reservations/:id/reject", post(reservations::reject_reservation))
        .route("/reservations/:id/borrow", post(reservations::mark_borrowed))
        .route("/reservations/:id/cancel", post(reservations::cancel_reservation))
        .route("/reservations/:id/renewal", post(reservations::request_renewal))
        .route("/reservations/:id/renewal/approve", post(reservations::approve_renewal))
        .route("/reservations/:id/renewal/reject", post(reservations::reject_renewal))
        .route("/sweep", post(reservations::sweep_expired))
        // Returns
        .route("/reservations/:id/return", post(returns::process_return))
        .route("/returns/:reservation_id", get(returns::get_return))
        // Walk-in borrowing
        .route("/borrowing/direct", post(borrowing::direct_borrow))
        .route("/borrowing/eligibility", get(borrowing::check_eligibility))
        // Penalty ledger
        .route("/users/:id/penalties", get(penalties::user_penalties))
        .route("/users/:id/unrestrict", post(penalties::unrestrict_user))
        .route("/penalties/:id/settle", post(penalties::settle_penalty))
        .route("/penalties/:id", delete(penalties::remove_penalty))
        .route("/reservations/:id/settle", post(penalties::settle_return))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
