//! API integration tests against a running server
//!
//! Tokens are signed locally with `JWT_SECRET` (or the default secret), so the
//! server must share it. `LIBRIS_ADMIN_ID` names an existing admin account.

use reqwest::Client;
use serde_json::{json, Value};

use libris_server::models::{Role, UserClaims};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn token(user_id: i32, role: Role) -> String {
    let secret = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "change-this-secret-in-production".to_string());
    let now = chrono::Utc::now().timestamp();
    UserClaims {
        sub: format!("user-{}", user_id),
        user_id,
        role,
        exp: now + 600,
        iat: now,
    }
    .create_token(&secret)
    .expect("Failed to sign token")
}

fn admin_token() -> String {
    let id = std::env::var("LIBRIS_ADMIN_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    token(id, Role::Admin)
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_reports_lending_rules() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["pickup_window_minutes"].is_number());
    assert!(body["loan_period_days"].is_number());
}

#[tokio::test]
#[ignore]
async fn test_unauthenticated_request_rejected() {
    let client = Client::new();

    let response = client
        .post(format!("{}/reservations", BASE_URL))
        .json(&json!({ "book_id": 1 }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_list_pending_reservations() {
    let client = Client::new();

    let response = client
        .get(format!("{}/reservations?view=pending", BASE_URL))
        .bearer_auth(admin_token())
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.is_array());
}

#[tokio::test]
#[ignore]
async fn test_sweep_expired_approvals() {
    let client = Client::new();

    let response = client
        .post(format!("{}/sweep", BASE_URL))
        .bearer_auth(admin_token())
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["cancelled"].is_number());
}

#[tokio::test]
#[ignore]
async fn test_unknown_reservation_not_found() {
    let client = Client::new();

    let response = client
        .get(format!("{}/reservations/{}", BASE_URL, i32::MAX))
        .bearer_auth(admin_token())
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["success"], false);
}
