//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{borrowing, health, penalties, reservations, returns};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "1.0.0",
        description = "Campus library reservation, borrowing and return REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Reservations
        reservations::create_reservation,
        reservations::list_reservations,
        reservations::list_my_reservations,
        reservations::get_reservation,
        reservations::approve_reservation,
        reservations::reject_reservation,
        reservations::mark_borrowed,
        reservations::cancel_reservation,
        reservations::sweep_expired,
        // Renewals
        reservations::request_renewal,
        reservations::approve_renewal,
        reservations::reject_renewal,
        // Returns
        returns::process_return,
        returns::get_return,
        // Borrowing
        borrowing::check_eligibility,
        borrowing::direct_borrow,
        // Penalties
        penalties::user_penalties,
        penalties::settle_penalty,
        penalties::settle_return,
        penalties::remove_penalty,
        penalties::unrestrict_user,
    ),
    components(
        schemas(
            // Reservations
            crate::models::Reservation,
            crate::models::ReservationStatus,
            crate::models::ReservationView,
            crate::models::CreateReservation,
            crate::models::CancelReservation,
            reservations::ReservationResponse,
            reservations::SweepResponse,
            // Returns
            crate::models::ReturnRequest,
            crate::models::ReturnedAs,
            crate::models::DamageSeverity,
            crate::models::ReturnTransaction,
            crate::models::PaymentStatus,
            crate::services::returns::ReturnOutcome,
            // Borrowing
            crate::models::DirectBorrowRequest,
            crate::services::eligibility::EligibilityReport,
            // Penalties
            crate::models::Penalty,
            crate::models::PenaltyKind,
            crate::models::PenaltySummary,
            crate::models::User,
            crate::models::Role,
            // Health
            health::HealthResponse,
            health::ReadinessResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "reservations", description = "Reservation lifecycle"),
        (name = "renewals", description = "Loan renewals"),
        (name = "returns", description = "Returns and penalty assessment"),
        (name = "borrowing", description = "Walk-in borrowing"),
        (name = "penalties", description = "Penalty ledger and account restrictions")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_lifecycle_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/reservations",
            "/reservations/{id}/approve",
            "/reservations/{id}/return",
            "/borrowing/direct",
            "/penalties/{id}/settle",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
