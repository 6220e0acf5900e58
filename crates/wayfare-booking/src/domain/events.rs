//! Domain events for the booking context.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_core::event::{DomainEvent, EventMetadata};
use wayfare_core::gateway::PaymentMode;

/// Event type identifier for `BookingCreated`.
pub const BOOKING_CREATED_EVENT_TYPE: &str = "booking.created";
/// Event type identifier for `PaymentOpened`.
pub const PAYMENT_OPENED_EVENT_TYPE: &str = "booking.payment_opened";
/// Event type identifier for `AuthorizationRequested`.
pub const AUTHORIZATION_REQUESTED_EVENT_TYPE: &str = "booking.authorization_requested";
/// Event type identifier for `PaymentAuthorized`.
pub const PAYMENT_AUTHORIZED_EVENT_TYPE: &str = "booking.payment_authorized";
/// Event type identifier for `PaymentDeclined`.
pub const PAYMENT_DECLINED_EVENT_TYPE: &str = "booking.payment_declined";
/// Event type identifier for `AuthorizationUnresolved`.
pub const AUTHORIZATION_UNRESOLVED_EVENT_TYPE: &str = "booking.payment_attempt_unresolved";
/// Event type identifier for `PaymentRefunded`.
pub const PAYMENT_REFUNDED_EVENT_TYPE: &str = "booking.refunded";
/// Event type identifier for `BookingCancelled`.
pub const BOOKING_CANCELLED_EVENT_TYPE: &str = "booking.cancelled";
/// Event type identifier for `BookingCompleted`.
pub const BOOKING_COMPLETED_EVENT_TYPE: &str = "booking.completed";
/// Event type identifier for `CancellationRequested`.
pub const CANCELLATION_REQUESTED_EVENT_TYPE: &str = "booking.cancellation_requested";
/// Event type identifier for `ChargeOrphaned`.
pub const CHARGE_ORPHANED_EVENT_TYPE: &str = "booking.charge_orphaned";
/// Event type identifier for `OrphanedChargeRefunded`.
pub const ORPHANED_CHARGE_REFUNDED_EVENT_TYPE: &str = "booking.orphaned_charge_refunded";

/// Emitted when a booking and its first payment are created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCreated {
    /// The booking identifier.
    pub booking_id: Uuid,
    /// The owning subject.
    pub subject_id: Uuid,
    /// The booked package.
    pub package_id: Uuid,
    /// Seats requested.
    pub seats_requested: u32,
    /// Departure date.
    pub travel_date: NaiveDate,
    /// Per-seat price snapshot.
    pub unit_price: Decimal,
    /// Total price.
    pub total_price: Decimal,
    /// The payment opened alongside the booking.
    pub payment_id: Uuid,
}

/// Emitted when a new payment replaces a failed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOpened {
    /// The new payment.
    pub payment_id: Uuid,
    /// Amount, equal to the booking total.
    pub amount: Decimal,
}

/// Emitted before the gateway is asked to authorize a charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequested {
    /// The payment being charged.
    pub payment_id: Uuid,
    /// Payment path.
    pub mode: PaymentMode,
}

/// Emitted when the gateway authorized the charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorized {
    /// The payment.
    pub payment_id: Uuid,
    /// Gateway reference.
    pub transaction_ref: String,
}

/// Emitted when the gateway declined the charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDeclined {
    /// The payment.
    pub payment_id: Uuid,
    /// Gateway-supplied reason.
    pub reason: String,
}

/// Emitted when an authorization call failed without an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationUnresolved {
    /// The payment.
    pub payment_id: Uuid,
    /// Transport error.
    pub error: String,
}

/// Emitted when a completed payment was refunded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefunded {
    /// The payment.
    pub payment_id: Uuid,
    /// Gateway reference that was refunded.
    pub transaction_ref: String,
}

/// Emitted when a booking is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCancelled {
    /// The booking.
    pub booking_id: Uuid,
    /// Who asked for the cancellation.
    pub cancelled_by: Uuid,
}

/// Emitted when a booking is marked completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCompleted {
    /// The booking.
    pub booking_id: Uuid,
    /// The administrator who completed it.
    pub completed_by: Uuid,
}

/// Emitted when a paid booking is asked to cancel; the refund has to land
/// before the booking can be cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRequested {
    /// The booking.
    pub booking_id: Uuid,
    /// The payment to refund.
    pub payment_id: Uuid,
    /// Who asked for the cancellation.
    pub requested_by: Uuid,
}

/// Emitted when an authorized charge could not be kept by its payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeOrphaned {
    /// The payment the charge was requested for.
    pub payment_id: Uuid,
    /// Gateway reference of the charge.
    pub transaction_ref: String,
}

/// Emitted when the refund of an orphaned charge was acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedChargeRefunded {
    /// The payment the charge was requested for.
    pub payment_id: Uuid,
    /// Gateway reference that was refunded.
    pub transaction_ref: String,
}

/// Event payload variants for the booking context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BookingEventKind {
    /// A booking was created.
    BookingCreated(BookingCreated),
    /// A replacement payment was opened.
    PaymentOpened(PaymentOpened),
    /// An authorization call is about to be made.
    AuthorizationRequested(AuthorizationRequested),
    /// The charge was authorized.
    PaymentAuthorized(PaymentAuthorized),
    /// The charge was declined.
    PaymentDeclined(PaymentDeclined),
    /// The authorization call went unanswered.
    AuthorizationUnresolved(AuthorizationUnresolved),
    /// The charge was refunded.
    PaymentRefunded(PaymentRefunded),
    /// The booking was cancelled.
    BookingCancelled(BookingCancelled),
    /// The booking was completed.
    BookingCompleted(BookingCompleted),
    /// A cancellation is waiting on its refund.
    CancellationRequested(CancellationRequested),
    /// An authorized charge was left without a payment to hold it.
    ChargeOrphaned(ChargeOrphaned),
    /// An orphaned charge was refunded.
    OrphanedChargeRefunded(OrphanedChargeRefunded),
}

impl BookingEventKind {
    /// Returns the event type identifier for this payload.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::BookingCreated(_) => BOOKING_CREATED_EVENT_TYPE,
            Self::PaymentOpened(_) => PAYMENT_OPENED_EVENT_TYPE,
            Self::AuthorizationRequested(_) => AUTHORIZATION_REQUESTED_EVENT_TYPE,
            Self::PaymentAuthorized(_) => PAYMENT_AUTHORIZED_EVENT_TYPE,
            Self::PaymentDeclined(_) => PAYMENT_DECLINED_EVENT_TYPE,
            Self::AuthorizationUnresolved(_) => AUTHORIZATION_UNRESOLVED_EVENT_TYPE,
            Self::PaymentRefunded(_) => PAYMENT_REFUNDED_EVENT_TYPE,
            Self::BookingCancelled(_) => BOOKING_CANCELLED_EVENT_TYPE,
            Self::BookingCompleted(_) => BOOKING_COMPLETED_EVENT_TYPE,
            Self::CancellationRequested(_) => CANCELLATION_REQUESTED_EVENT_TYPE,
            Self::ChargeOrphaned(_) => CHARGE_ORPHANED_EVENT_TYPE,
            Self::OrphanedChargeRefunded(_) => ORPHANED_CHARGE_REFUNDED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the booking context.
#[derive(Debug, Clone)]
pub struct BookingEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: BookingEventKind,
}

impl DomainEvent for BookingEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("BookingEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
