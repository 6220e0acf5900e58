//! Commands for the booking context.

use chrono::NaiveDate;
use uuid::Uuid;
use wayfare_core::command::Command;
use wayfare_core::gateway::PaymentMode;
use wayfare_core::identity::Subject;

/// Command to create a booking.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The requesting subject, who becomes the owner.
    pub subject: Subject,
    /// The package to book.
    pub package_id: Uuid,
    /// Number of seats.
    pub seats_requested: u32,
    /// Departure date.
    pub travel_date: NaiveDate,
}

/// Command to pay for a pending booking.
#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The requesting subject.
    pub subject: Subject,
    /// The booking to pay for.
    pub booking_id: Uuid,
    /// Payment path.
    pub mode: PaymentMode,
}

/// Command to cancel a booking.
#[derive(Debug, Clone)]
pub struct CancelBooking {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The requesting subject.
    pub subject: Subject,
    /// The booking to cancel.
    pub booking_id: Uuid,
}

/// Command to mark a confirmed booking as travelled.
#[derive(Debug, Clone)]
pub struct MarkCompleted {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The requesting subject.
    pub subject: Subject,
    /// The booking to complete.
    pub booking_id: Uuid,
}

impl Command for CreateBooking {
    fn command_type(&self) -> &'static str {
        "booking.create"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for ConfirmPayment {
    fn command_type(&self) -> &'static str {
        "booking.confirm_payment"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for CancelBooking {
    fn command_type(&self) -> &'static str {
        "booking.cancel"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for MarkCompleted {
    fn command_type(&self) -> &'static str {
        "booking.mark_completed"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
