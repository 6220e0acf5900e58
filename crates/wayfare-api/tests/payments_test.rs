//! Integration tests for the payment endpoints.

mod common;

use axum::http::StatusCode;
use wayfare_core::error::DomainError;
use wayfare_core::gateway::PaymentMode;

use common::{TestApp, admin, user};

#[tokio::test]
async fn test_declined_payment_keeps_booking_payable() {
    // Arrange
    let app = TestApp::new();
    let owner = user();
    let package_id = app.package(100, 10);
    let booking_id = app.create_booking(owner, package_id, 2).await;
    app.gateway.decline_next("insufficient funds");
    let body = serde_json::json!({ "booking_id": booking_id });

    // Act
    let (declined, json) = app.post(owner, "/api/v1/payments/confirm", &body).await;
    let (retried, retry_json) = app.post(owner, "/api/v1/payments/confirm", &body).await;

    // Assert
    assert_eq!(declined, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json["error"], "payment_declined");
    assert_eq!(retried, StatusCode::OK);
    assert_eq!(retry_json["booking"]["status"], "confirmed");
    assert_eq!(retry_json["booking"]["failed_payments"], 1);
}

#[tokio::test]
async fn test_mode_defaults_to_card() {
    let app = TestApp::new();
    let owner = user();
    let package_id = app.package(100, 10);
    let booking_id = app.create_booking(owner, package_id, 1).await;

    app.pay(owner, booking_id).await;

    let charges = app.gateway.authorizations();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].mode, PaymentMode::Card);
}

#[tokio::test]
async fn test_gateway_outage_is_503_and_payment_stays_pending() {
    // Arrange
    let app = TestApp::new();
    let owner = user();
    let package_id = app.package(100, 10);
    let booking_id = app.create_booking(owner, package_id, 1).await;
    app.gateway
        .push_authorize(Err(DomainError::GatewayUnavailable("timed out".into())));

    // Act
    let (status, json) = app
        .post(
            owner,
            "/api/v1/payments/confirm",
            &serde_json::json!({ "booking_id": booking_id }),
        )
        .await;

    // Assert
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "gateway_unavailable");
    let (_, booking) = app
        .get(owner, &format!("/api/v1/bookings/{booking_id}"))
        .await;
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["payment"]["status"], "pending");
    assert!(booking["payment"]["last_gateway_error"].is_string());
}

#[tokio::test]
async fn test_only_owner_or_admin_may_pay() {
    // Arrange
    let app = TestApp::new();
    let package_id = app.package(100, 10);
    let booking_id = app.create_booking(user(), package_id, 1).await;
    let body = serde_json::json!({ "booking_id": booking_id });

    // Act
    let (stranger, _) = app.post(user(), "/api/v1/payments/confirm", &body).await;
    let (operator, _) = app.post(admin(), "/api/v1/payments/confirm", &body).await;

    // Assert
    assert_eq!(stranger, StatusCode::FORBIDDEN);
    assert_eq!(operator, StatusCode::OK);
}

#[tokio::test]
async fn test_paying_twice_is_illegal() {
    let app = TestApp::new();
    let owner = user();
    let package_id = app.package(100, 10);
    let booking_id = app.create_booking(owner, package_id, 1).await;
    app.pay(owner, booking_id).await;

    let (status, json) = app
        .post(
            owner,
            "/api/v1/payments/confirm",
            &serde_json::json!({ "booking_id": booking_id }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "illegal_transition");
    assert_eq!(app.gateway.authorizations().len(), 1);
}

#[tokio::test]
async fn test_history_includes_declined_payments() {
    // Arrange
    let app = TestApp::new();
    let owner = user();
    let package_id = app.package(100, 10);
    let booking_id = app.create_booking(owner, package_id, 1).await;
    app.gateway.decline_next("card expired");
    let body = serde_json::json!({ "booking_id": booking_id });
    app.post(owner, "/api/v1/payments/confirm", &body).await;
    app.pay(owner, booking_id).await;

    // Act
    let (status, json) = app.get(owner, "/api/v1/payments/history").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    let statuses: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&"failed"));
    assert!(statuses.contains(&"completed"));
}
