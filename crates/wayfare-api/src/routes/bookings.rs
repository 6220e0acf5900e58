//! Routes for the booking lifecycle.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use wayfare_booking::application::command_handlers::{self, BookingCommandResult};
use wayfare_booking::application::query_handlers::{self, BookingView};
use wayfare_booking::domain::commands;
use wayfare_core::event::StoredEvent;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// The package to book.
    pub package_id: Uuid,
    /// Number of seats.
    pub seats_requested: u32,
    /// Departure date.
    pub travel_date: NaiveDate,
}

/// Response body returned after a booking command is handled.
#[derive(Debug, Serialize)]
pub struct BookingCommandResponse {
    /// The booking as committed.
    pub booking: BookingView,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

impl From<BookingCommandResult> for BookingCommandResponse {
    fn from(result: BookingCommandResult) -> Self {
        Self {
            booking: BookingView::from(&result.record),
            event_ids: result.stored_events.iter().map(|e| e.event_id).collect(),
        }
    }
}

/// POST /
#[instrument(skip(state, caller, request), fields(package_id = %request.package_id, seats = request.seats_requested))]
async fn create_booking(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingCommandResponse>), ApiError> {
    let command = commands::CreateBooking {
        correlation_id: Uuid::new_v4(),
        subject: caller,
        package_id: request.package_id,
        seats_requested: request.seats_requested,
        travel_date: request.travel_date,
    };

    info!(correlation_id = %command.correlation_id, "handling create_booking command");

    let result = command_handlers::handle_create_booking(
        &command,
        state.clock.as_ref(),
        state.catalog.as_ref(),
        state.ledger.as_ref(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(result.into())))
}

/// POST /{id}/cancel
#[instrument(skip(state, caller), fields(booking_id = %booking_id))]
async fn cancel_booking(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingCommandResponse>, ApiError> {
    let command = commands::CancelBooking {
        correlation_id: Uuid::new_v4(),
        subject: caller,
        booking_id,
    };

    info!(correlation_id = %command.correlation_id, "handling cancel_booking command");

    let result = command_handlers::handle_cancel_booking(
        &command,
        state.clock.as_ref(),
        state.ledger.as_ref(),
        state.gateway.as_ref(),
        &state.refunds,
    )
    .await?;

    Ok(Json(result.into()))
}

/// POST /{id}/complete
#[instrument(skip(state, caller), fields(booking_id = %booking_id))]
async fn mark_completed(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingCommandResponse>, ApiError> {
    let command = commands::MarkCompleted {
        correlation_id: Uuid::new_v4(),
        subject: caller,
        booking_id,
    };

    info!(correlation_id = %command.correlation_id, "handling mark_completed command");

    let result =
        command_handlers::handle_mark_completed(&command, state.clock.as_ref(), state.ledger.as_ref())
            .await?;

    Ok(Json(result.into()))
}

/// GET /mine
async fn list_my_bookings(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = query_handlers::list_my_bookings(&caller, state.ledger.as_ref()).await?;
    Ok(Json(bookings))
}

/// GET /{id}
async fn get_booking(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingView>, ApiError> {
    let booking = query_handlers::get_booking(&caller, booking_id, state.ledger.as_ref()).await?;
    Ok(Json(booking))
}

/// GET /{id}/history
async fn booking_history(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    let events =
        query_handlers::booking_history(&caller, booking_id, state.ledger.as_ref()).await?;
    Ok(Json(events))
}

/// Returns the router for bookings.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_booking))
        .route("/mine", get(list_my_bookings))
        .route("/{id}", get(get_booking))
        .route("/{id}/history", get(booking_history))
        .route("/{id}/cancel", post(cancel_booking))
        .route("/{id}/complete", post(mark_completed))
}
