//! Booking and Payment records.
//!
//! Both are plain values keyed by id. Fields are readable through accessors
//! only; the aggregate in [`super::aggregates`] is the sole writer.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_core::gateway::PaymentMode;
use wayfare_core::lifecycle::{BookingStatus, PaymentStatus};

/// A customer's request to travel on a package on a given date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub(crate) id: Uuid,
    pub(crate) package_id: Uuid,
    pub(crate) subject_id: Uuid,
    pub(crate) seats_requested: u32,
    pub(crate) travel_date: NaiveDate,
    pub(crate) unit_price: Decimal,
    pub(crate) total_price: Decimal,
    pub(crate) status: BookingStatus,
    #[serde(default)]
    pub(crate) cancellation_requested_by: Option<Uuid>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Booking {
    /// Booking identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The booked package.
    #[must_use]
    pub fn package_id(&self) -> Uuid {
        self.package_id
    }

    /// The owning subject.
    #[must_use]
    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    /// Number of seats requested.
    #[must_use]
    pub fn seats_requested(&self) -> u32 {
        self.seats_requested
    }

    /// Departure date.
    #[must_use]
    pub fn travel_date(&self) -> NaiveDate {
        self.travel_date
    }

    /// Per-seat price captured at creation.
    #[must_use]
    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    /// `unit_price × seats_requested`, fixed at creation.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> BookingStatus {
        self.status
    }

    /// Who asked for a cancellation that is waiting on its refund.
    #[must_use]
    pub fn cancellation_requested_by(&self) -> Option<Uuid> {
        self.cancellation_requested_by
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last transition.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// The financial record for one booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub(crate) id: Uuid,
    pub(crate) booking_id: Uuid,
    pub(crate) amount: Decimal,
    pub(crate) status: PaymentStatus,
    pub(crate) transaction_ref: Option<String>,
    pub(crate) mode: PaymentMode,
    pub(crate) authorization_attempts: u32,
    pub(crate) last_gateway_error: Option<String>,
    #[serde(default)]
    pub(crate) authorization_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) orphaned_charges: Vec<OrphanedCharge>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Payment {
    /// Payment identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The booking this payment belongs to.
    #[must_use]
    pub fn booking_id(&self) -> Uuid {
        self.booking_id
    }

    /// Charged amount; equals the booking total.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Gateway reference, set once authorized.
    #[must_use]
    pub fn transaction_ref(&self) -> Option<&str> {
        self.transaction_ref.as_deref()
    }

    /// Payment path used.
    #[must_use]
    pub fn mode(&self) -> PaymentMode {
        self.mode
    }

    /// Number of authorization calls issued against this payment.
    #[must_use]
    pub fn authorization_attempts(&self) -> u32 {
        self.authorization_attempts
    }

    /// Reason of the last unresolved or declined gateway call.
    #[must_use]
    pub fn last_gateway_error(&self) -> Option<&str> {
        self.last_gateway_error.as_deref()
    }

    /// Start of the authorization call currently in flight, if any.
    #[must_use]
    pub fn authorization_started_at(&self) -> Option<DateTime<Utc>> {
        self.authorization_started_at
    }

    /// Charges the gateway authorized that this payment could not keep.
    #[must_use]
    pub fn orphaned_charges(&self) -> &[OrphanedCharge] {
        &self.orphaned_charges
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last change.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// A charge authorized by the gateway that could not be attached to its
/// payment, typically because the booking was cancelled while the
/// authorization call was in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedCharge {
    pub(crate) transaction_ref: String,
    pub(crate) recorded_at: DateTime<Utc>,
    pub(crate) refunded_at: Option<DateTime<Utc>>,
}

impl OrphanedCharge {
    /// Gateway reference of the charge.
    #[must_use]
    pub fn transaction_ref(&self) -> &str {
        &self.transaction_ref
    }

    /// When the charge was found orphaned.
    #[must_use]
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// When the refund of the charge was acknowledged.
    #[must_use]
    pub fn refunded_at(&self) -> Option<DateTime<Utc>> {
        self.refunded_at
    }
}

/// A booking together with every payment ever opened for it.
///
/// At most one payment is not `Failed`; it is always the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub(crate) booking: Booking,
    pub(crate) payments: Vec<Payment>,
}

impl BookingRecord {
    /// The booking.
    #[must_use]
    pub fn booking(&self) -> &Booking {
        &self.booking
    }

    /// All payments, oldest first.
    #[must_use]
    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// The payment that is not `Failed`, if any.
    #[must_use]
    pub fn active_payment(&self) -> Option<&Payment> {
        self.payments
            .iter()
            .rev()
            .find(|p| p.status != PaymentStatus::Failed)
    }

    pub(crate) fn payment_mut(&mut self, payment_id: Uuid) -> Option<&mut Payment> {
        self.payments.iter_mut().find(|p| p.id == payment_id)
    }
}
