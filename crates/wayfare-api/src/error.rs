//! Wayfare — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use wayfare_core::error::DomainError;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A collaborator failed while the server was being assembled.
    #[error("startup error: {0}")]
    Startup(#[from] DomainError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// The status and error code a domain error is reported with.
    #[must_use]
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            DomainError::InvalidSeats { .. } => (StatusCode::BAD_REQUEST, "invalid_seats"),
            DomainError::InvalidTravelDate { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_travel_date")
            }
            DomainError::CapacityExceeded { .. } => (StatusCode::BAD_REQUEST, "capacity_exceeded"),
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            DomainError::PackageUnavailable(_) => (StatusCode::CONFLICT, "package_unavailable"),
            DomainError::PackageNotFound(_) => (StatusCode::NOT_FOUND, "package_not_found"),
            DomainError::BookingNotFound(_) => (StatusCode::NOT_FOUND, "booking_not_found"),
            DomainError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            DomainError::IllegalTransition { .. } => (StatusCode::CONFLICT, "illegal_transition"),
            DomainError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            DomainError::ConcurrentModification(_) => {
                (StatusCode::CONFLICT, "concurrent_modification")
            }
            DomainError::TravelDateNotReached { .. } => {
                (StatusCode::CONFLICT, "travel_date_not_reached")
            }
            DomainError::GatewayDeclined(_) => (StatusCode::PAYMENT_REQUIRED, "payment_declined"),
            DomainError::GatewayUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "gateway_unavailable")
            }
            DomainError::RefundFailed { .. } => (StatusCode::BAD_GATEWAY, "refund_failed"),
            DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
