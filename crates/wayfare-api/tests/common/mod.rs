//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{NaiveDate, TimeZone, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use tower::ServiceExt;
use uuid::Uuid;
use wayfare_booking::application::refund_queue::RefundRetryQueue;
use wayfare_booking::ledger::InMemoryLedgerStore;
use wayfare_core::identity::Subject;
use wayfare_test_support::{FixedClock, InMemoryCatalog, ScriptedGateway};

use wayfare_api::auth::{SUBJECT_ID_HEADER, SUBJECT_ROLE_HEADER};
use wayfare_api::build_router;
use wayfare_api::state::AppState;

/// A travel date after the fixed test clock.
pub fn travel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
}

/// The full app wired to in-process collaborators the test can steer.
pub struct TestApp {
    pub state: AppState,
    pub catalog: Arc<InMemoryCatalog>,
    pub gateway: Arc<ScriptedGateway>,
}

impl TestApp {
    /// Builds the app on 2026-01-15 10:00 UTC.
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let catalog = Arc::new(InMemoryCatalog::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let state = AppState::new(
            clock,
            catalog.clone(),
            Arc::new(InMemoryLedgerStore::new()),
            gateway.clone(),
            RefundRetryQueue::default(),
        );
        Self {
            state,
            catalog,
            gateway,
        }
    }

    /// A router over the shared state. Each request consumes one.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Adds an available package priced at `price` per seat.
    pub fn package(&self, price: i64, seat_capacity: u32) -> Uuid {
        self.catalog.add_package(Decimal::from(price), seat_capacity)
    }

    /// POST with a JSON body on behalf of `subject`.
    pub async fn post(
        &self,
        subject: Subject,
        uri: &str,
        body: &serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(SUBJECT_ID_HEADER, subject.subject_id.to_string())
            .header(SUBJECT_ROLE_HEADER, subject.role.to_string())
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap();
        send(self.router(), request).await
    }

    /// GET on behalf of `subject`.
    pub async fn get(&self, subject: Subject, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(SUBJECT_ID_HEADER, subject.subject_id.to_string())
            .header(SUBJECT_ROLE_HEADER, subject.role.to_string())
            .body(Body::empty())
            .unwrap();
        send(self.router(), request).await
    }

    /// Creates a booking and returns its id.
    pub async fn create_booking(&self, subject: Subject, package_id: Uuid, seats: u32) -> Uuid {
        let (status, json) = self
            .post(
                subject,
                "/api/v1/bookings",
                &serde_json::json!({
                    "package_id": package_id,
                    "seats_requested": seats,
                    "travel_date": travel_date(),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["booking"]["booking_id"].as_str().unwrap().parse().unwrap()
    }

    /// Pays for a booking and asserts success.
    pub async fn pay(&self, subject: Subject, booking_id: Uuid) {
        let (status, json) = self
            .post(
                subject,
                "/api/v1/payments/confirm",
                &serde_json::json!({ "booking_id": booking_id }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
    }
}

/// A fresh customer credential.
pub fn user() -> Subject {
    Subject::user(Uuid::new_v4())
}

/// A fresh operator credential.
pub fn admin() -> Subject {
    Subject::admin(Uuid::new_v4())
}

/// Send a request without credential headers.
pub async fn send_anonymous(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&body_bytes).into()))
    };

    (status, json)
}
