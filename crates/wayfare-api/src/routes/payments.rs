//! Routes for payments.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use wayfare_booking::application::command_handlers;
use wayfare_booking::application::query_handlers::{self, PaymentView};
use wayfare_booking::domain::commands;
use wayfare_core::gateway::PaymentMode;

use super::bookings::BookingCommandResponse;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /confirm.
#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    /// The booking to pay for.
    pub booking_id: Uuid,
    /// Payment path; card when omitted.
    #[serde(default)]
    pub mode: PaymentMode,
}

/// POST /confirm
#[instrument(skip(state, caller, request), fields(booking_id = %request.booking_id, mode = %request.mode))]
async fn confirm_payment(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<BookingCommandResponse>, ApiError> {
    let command = commands::ConfirmPayment {
        correlation_id: Uuid::new_v4(),
        subject: caller,
        booking_id: request.booking_id,
        mode: request.mode,
    };

    info!(correlation_id = %command.correlation_id, "handling confirm_payment command");

    let result = command_handlers::handle_confirm_payment(
        &command,
        state.clock.as_ref(),
        state.ledger.as_ref(),
        state.gateway.as_ref(),
        &state.refunds,
    )
    .await?;

    Ok(Json(result.into()))
}

/// GET /history
async fn payment_history(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<PaymentView>>, ApiError> {
    let payments = query_handlers::payment_history(&caller, state.ledger.as_ref()).await?;
    Ok(Json(payments))
}

/// Returns the router for payments.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/confirm", post(confirm_payment))
        .route("/history", get(payment_history))
}
