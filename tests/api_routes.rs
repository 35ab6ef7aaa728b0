//! Router-level tests: status codes, auth and error bodies

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::Harness;
use libris_server::{
    api,
    error::ErrorCode,
    models::{Actor, UserClaims},
};

fn token_for(actor: &Actor) -> String {
    let now = chrono::Utc::now().timestamp();
    UserClaims {
        sub: format!("user-{}", actor.user_id),
        user_id: actor.user_id,
        role: actor.role,
        exp: now + 3600,
        iat: now,
    }
    .create_token("test-secret")
    .unwrap()
}

fn app(h: &Harness) -> Router {
    api::router(h.state.clone())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, actor: &Actor, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(actor)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_as(uri: &str, actor: &Actor) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(actor)))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
    let h = Harness::new().await;
    let request = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();

    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn readiness_reports_lending_rules() {
    let h = Harness::new().await;
    let request = Request::builder().uri("/api/v1/ready").body(Body::empty()).unwrap();

    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["pickup_window_minutes"], 2);
    assert_eq!(body["loan_period_days"], 14);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let h = Harness::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/reservations")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "book_id": 1 }).to_string()))
        .unwrap();

    let (status, body) = send(app(&h), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], ErrorCode::NotAuthorized as u32);
}

#[tokio::test]
async fn reserving_returns_created_with_derived_fields() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Over HTTP", 1).await;

    let (status, body) = send(
        app(&h),
        post_json("/api/v1/reservations", &ana, json!({ "book_id": book.id })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["user_id"], ana.user_id);
    assert_eq!(body["is_overdue"], false);
    assert!(body["pickup_deadline"].is_null());
}

#[tokio::test]
async fn ineligible_reservation_carries_its_code() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("None Left", 0).await;

    let (status, body) = send(
        app(&h),
        post_json("/api/v1/reservations", &ana, json!({ "book_id": book.id })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], ErrorCode::NoCopiesAvailable as u32);
}

#[tokio::test]
async fn invalid_ids_are_bad_requests() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;

    let (status, body) = send(
        app(&h),
        post_json("/api/v1/reservations", &ana, json!({ "book_id": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], ErrorCode::BadValue as u32);
}

#[tokio::test]
async fn approving_twice_conflicts() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Twice", 2).await;
    let r = h.reserve(&ana, book.id).await;
    let uri = format!("/api/v1/reservations/{}/approve", r.id);

    let (status, body) = send(app(&h), post_json(&uri, &h.librarian, Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert!(body["pickup_deadline"].is_string());

    let (status, body) = send(app(&h), post_json(&uri, &h.librarian, Value::Null)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], ErrorCode::StateConflict as u32);
}

#[tokio::test]
async fn students_are_forbidden_from_staff_routes() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;

    let (status, _) = send(app(&h), get_as("/api/v1/reservations?view=pending", &ana)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(app(&h), get_as("/api/v1/reservations/mine", &ana)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn return_body_is_validated() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Validated", 1).await;
    let r = h.borrowed(&ana, book.id).await;
    let uri = format!("/api/v1/reservations/{}/return", r.id);

    let (status, _) = send(
        app(&h),
        post_json(&uri, &h.librarian, json!({ "condition": "damaged" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app(&h),
        post_json(
            &uri,
            &h.librarian,
            json!({ "condition": "damaged", "damage_severity": "minor" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction"]["condition_penalty"], "100");
    assert_eq!(body["partial_success"], false);
}

#[tokio::test]
async fn eligibility_query_reports_without_failing() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Empty Shelf", 0).await;
    let uri = format!(
        "/api/v1/borrowing/eligibility?user_id={}&book_id={}",
        ana.user_id, book.id
    );

    let (status, body) = send(app(&h), get_as(&uri, &h.librarian)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["eligible"], false);
    assert_eq!(body["code"], ErrorCode::NoCopiesAvailable as u32);
}
