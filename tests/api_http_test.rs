mod common;

use axum::{
    body,
    http::{Method, StatusCode},
    response::Response,
};
use common::{Actor, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}))
}

// Ignored by default because it requires SQLite with migrations.
// Run with: cargo test -- --ignored
#[tokio::test]
#[ignore]
async fn purchase_request_http_lifecycle() {
    let app = TestApp::new().await;
    let org = Uuid::new_v4();
    let product = app.seed_product(org, 10, dec!(50)).await;
    let client = Actor::client(org);
    let admin = Actor::admin(org);

    // Submit
    let response = app
        .request(
            Method::POST,
            "/api/v1/purchase-requests",
            Some(json!({
                "product_id": product.id,
                "quantity": 4,
                "unit_price": "50",
            })),
            client,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["status"], "pending");
    let request_id = created["id"].as_str().unwrap().to_string();

    // Listing scoped to the organization sees the pending request.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/purchase-requests?organization_id={}", org),
            None,
            admin,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = json_body(response).await;
    assert_eq!(listed["pagination"]["total"], 1);
    assert_eq!(listed["scope"], "organization");

    // Approve
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/purchase-requests/{}/approve", request_id),
            None,
            admin,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let approved = json_body(response).await;
    assert_eq!(approved["manufacturer_stock"], 6);
    assert_eq!(approved["client_stock"], 4);
    let order_id = approved["order"]["id"].as_str().unwrap().to_string();

    // Approving again conflicts.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/purchase-requests/{}/approve", request_id),
            None,
            admin,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Order is fetchable by id.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            admin,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let order = json_body(response).await;
    assert_eq!(order["total_amount"], "200");
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn approval_of_oversized_request_returns_422() {
    let app = TestApp::new().await;
    let org = Uuid::new_v4();
    let product = app.seed_product(org, 6, dec!(50)).await;
    let client = Actor::client(org);
    let admin = Actor::admin(org);

    let response = app
        .request(
            Method::POST,
            "/api/v1/purchase-requests",
            Some(json!({
                "product_id": product.id,
                "quantity": 8,
                "unit_price": "50",
            })),
            client,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let request_id = created["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/purchase-requests/{}/approve", request_id),
            None,
            admin,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The request is still pending and can be rejected instead.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/purchase-requests/{}/reject", request_id),
            Some(json!({ "reason": "Not enough stock this quarter" })),
            admin,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rejected = json_body(response).await;
    assert_eq!(rejected["status"], "rejected");
}

#[tokio::test]
#[ignore]
async fn missing_actor_header_is_a_bad_request() {
    let app = TestApp::new().await;

    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/api/v1/purchase-requests")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
