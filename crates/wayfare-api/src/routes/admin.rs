//! Operator routes: all bookings, the report, and the refund retry queue.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, instrument};
use uuid::Uuid;
use wayfare_booking::application::query_handlers::{self, BookingReport, BookingView};
use wayfare_booking::application::refund_queue::{RefundTask, process_due_refunds};
use wayfare_core::clock::Clock;
use wayfare_core::error::DomainError;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /bookings
async fn list_all_bookings(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = query_handlers::list_all_bookings(&caller, state.ledger.as_ref()).await?;
    Ok(Json(bookings))
}

/// GET /report
async fn booking_report(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<BookingReport>, ApiError> {
    let report = query_handlers::booking_report(&caller, state.ledger.as_ref()).await?;
    Ok(Json(report))
}

/// GET /refunds
async fn list_refund_tasks(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<RefundTask>>, ApiError> {
    caller.require_admin("view refund tasks")?;
    Ok(Json(state.refunds.tasks(state.ledger.as_ref()).await?))
}

/// POST /refunds/{payment_id}/retry
///
/// Makes the task due and runs one sweep, so the response shows the
/// outcome of the forced attempt.
#[instrument(skip(state, caller), fields(payment_id = %payment_id))]
async fn retry_refund(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<RefundTask>, ApiError> {
    caller.require_admin("retry refunds")?;
    state
        .refunds
        .force_retry(state.ledger.as_ref(), payment_id, state.clock.now())
        .await?;
    info!(subject_id = %caller.subject_id, "operator forced refund retry");

    process_due_refunds(
        &state.refunds,
        state.clock.as_ref(),
        state.ledger.as_ref(),
        state.gateway.as_ref(),
    )
    .await?;

    let task = state
        .refunds
        .get(state.ledger.as_ref(), payment_id)
        .await?
        .ok_or_else(|| {
            DomainError::Infrastructure(format!(
                "refund task for payment {payment_id} disappeared"
            ))
        })?;
    Ok(Json(task))
}

/// Returns the router for operator endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_all_bookings))
        .route("/report", get(booking_report))
        .route("/refunds", get(list_refund_tasks))
        .route("/refunds/{payment_id}/retry", post(retry_refund))
}
