//! Liveness and ledger readiness.
//!
//! `/health` answers without credentials. It reads the refund tasks through
//! the ledger, so a broken store shows up here as `503` with status
//! `degraded`; the open and escalated refund counts tell operators whether
//! money is waiting on the gateway.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use wayfare_booking::application::refund_queue::RefundTaskStatus;
use wayfare_core::clock::Clock;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `wayfare`.
    pub service: &'static str,
    /// `ok`, or `degraded` when the ledger cannot be read.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Clock reading at the time of the check.
    pub checked_at: DateTime<Utc>,
    /// Refund tasks still waiting for the gateway.
    pub open_refunds: Option<usize>,
    /// Refund tasks that ran out of attempts.
    pub escalated_refunds: Option<usize>,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut response = HealthResponse {
        service: "wayfare",
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        checked_at: state.clock.now(),
        open_refunds: None,
        escalated_refunds: None,
    };
    match state.refunds.tasks(state.ledger.as_ref()).await {
        Ok(tasks) => {
            let count =
                |status: RefundTaskStatus| tasks.iter().filter(|t| t.status == status).count();
            response.open_refunds = Some(count(RefundTaskStatus::Waiting));
            response.escalated_refunds = Some(count(RefundTaskStatus::Escalated));
            (StatusCode::OK, Json(response))
        }
        Err(err) => {
            warn!(error = %err, "health check could not read the ledger");
            response.status = "degraded";
            (StatusCode::SERVICE_UNAVAILABLE, Json(response))
        }
    }
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
