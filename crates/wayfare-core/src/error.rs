//! Domain error types.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::lifecycle::{BookingStatus, PaymentStatus};

/// Coarse classification of a [`DomainError`], used by callers to decide
/// whether re-reading state and retrying makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected input; retry with corrected input.
    Validation,
    /// Caller lacks the capability for the action.
    Authorization,
    /// Source state did not match; re-read and retry.
    State,
    /// The payment gateway refused or could not be reached.
    Gateway,
    /// Storage or serialization failure.
    Infrastructure,
}

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Fewer than one seat was requested.
    #[error("invalid seat count: {requested} (at least one seat is required)")]
    InvalidSeats {
        /// The number of seats requested.
        requested: u32,
    },

    /// The travel date lies in the past.
    #[error("travel date {travel_date} is before {today}")]
    InvalidTravelDate {
        /// The requested travel date.
        travel_date: NaiveDate,
        /// The current date.
        today: NaiveDate,
    },

    /// The package is not open for new bookings.
    #[error("package {0} is not available for booking")]
    PackageUnavailable(Uuid),

    /// More seats were requested than the package can carry.
    #[error("requested {requested} seats but package {package_id} carries at most {capacity}")]
    CapacityExceeded {
        /// The package.
        package_id: Uuid,
        /// The number of seats requested.
        requested: u32,
        /// The package seat capacity.
        capacity: u32,
    },

    /// The catalog does not know the package.
    #[error("package not found: {0}")]
    PackageNotFound(Uuid),

    /// No booking exists with this identifier.
    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    /// The subject may not perform the action.
    #[error("subject {subject_id} is not allowed to {action}")]
    Unauthorized {
        /// The requesting subject.
        subject_id: Uuid,
        /// The refused action.
        action: &'static str,
    },

    /// The requested transition does not apply to the current state.
    #[error(
        "cannot {action} booking {booking_id}: booking is {booking_status}, payment is {}",
        .payment_status.map_or("absent", |s| s.as_str())
    )]
    IllegalTransition {
        /// The booking.
        booking_id: Uuid,
        /// The attempted transition.
        action: &'static str,
        /// Actual booking status.
        booking_status: BookingStatus,
        /// Actual status of the active payment, if any.
        payment_status: Option<PaymentStatus>,
    },

    /// Optimistic concurrency conflict reported by a ledger store.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A transition collided with another writer twice in a row.
    #[error("booking {0} was modified concurrently; re-read and retry")]
    ConcurrentModification(Uuid),

    /// The gateway declined the charge.
    #[error("payment declined: {0}")]
    GatewayDeclined(String),

    /// The gateway could not be reached or did not answer in time.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The refund could not be issued; the booking was left unchanged.
    #[error("refund for booking {booking_id} failed: {reason}")]
    RefundFailed {
        /// The booking whose cancellation is blocked.
        booking_id: Uuid,
        /// Gateway-supplied reason.
        reason: String,
    },

    /// Completion was requested before the travel date.
    #[error("booking {booking_id} travels on {travel_date}; it cannot be completed yet")]
    TravelDateNotReached {
        /// The booking.
        booking_id: Uuid,
        /// Its travel date.
        travel_date: NaiveDate,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Classifies the error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidSeats { .. }
            | Self::InvalidTravelDate { .. }
            | Self::PackageUnavailable(_)
            | Self::CapacityExceeded { .. }
            | Self::PackageNotFound(_)
            | Self::BookingNotFound(_)
            | Self::TravelDateNotReached { .. }
            | Self::Validation(_) => ErrorCategory::Validation,
            Self::Unauthorized { .. } => ErrorCategory::Authorization,
            Self::IllegalTransition { .. }
            | Self::ConcurrencyConflict { .. }
            | Self::ConcurrentModification(_) => ErrorCategory::State,
            Self::GatewayDeclined(_) | Self::GatewayUnavailable(_) | Self::RefundFailed { .. } => {
                ErrorCategory::Gateway
            }
            Self::Infrastructure(_) => ErrorCategory::Infrastructure,
        }
    }

    /// True when a caller may reasonably retry after re-reading state.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. }
                | Self::ConcurrentModification(_)
                | Self::IllegalTransition { .. }
                | Self::GatewayUnavailable(_)
                | Self::RefundFailed { .. }
        )
    }
}
