//! Query handlers for the booking context.
//!
//! Read-only views over the ledger. Every query checks the caller's
//! credential the same way the state machine does: owners see their own
//! bookings, administrators see everything.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use wayfare_core::error::DomainError;
use wayfare_core::event::StoredEvent;
use wayfare_core::gateway::PaymentMode;
use wayfare_core::identity::Subject;
use wayfare_core::lifecycle::{BookingStatus, PaymentStatus};

use crate::domain::records::{BookingRecord, OrphanedCharge, Payment};
use crate::ledger::LedgerStore;

/// Read-only view of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentView {
    /// The payment identifier.
    pub payment_id: Uuid,
    /// The booking it pays for.
    pub booking_id: Uuid,
    /// Charged amount.
    pub amount: Decimal,
    /// Current status.
    pub status: PaymentStatus,
    /// Gateway reference, once authorized.
    pub transaction_ref: Option<String>,
    /// Payment path.
    pub mode: PaymentMode,
    /// Authorization calls issued.
    pub authorization_attempts: u32,
    /// Last gateway failure, if any.
    pub last_gateway_error: Option<String>,
    /// Charges authorized for this payment that it could not keep.
    pub orphaned_charges: Vec<OrphanedCharge>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id(),
            booking_id: payment.booking_id(),
            amount: payment.amount(),
            status: payment.status(),
            transaction_ref: payment.transaction_ref().map(str::to_owned),
            mode: payment.mode(),
            authorization_attempts: payment.authorization_attempts(),
            last_gateway_error: payment.last_gateway_error().map(str::to_owned),
            orphaned_charges: payment.orphaned_charges().to_vec(),
            created_at: payment.created_at(),
            updated_at: payment.updated_at(),
        }
    }
}

/// Read-only view of a booking and its current payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    /// The booking identifier.
    pub booking_id: Uuid,
    /// The booked package.
    pub package_id: Uuid,
    /// The owner.
    pub subject_id: Uuid,
    /// Seats requested.
    pub seats_requested: u32,
    /// Departure date.
    pub travel_date: NaiveDate,
    /// Per-seat price at creation.
    pub unit_price: Decimal,
    /// Total price.
    pub total_price: Decimal,
    /// Current status.
    pub status: BookingStatus,
    /// Whether a cancellation is waiting on its refund.
    pub cancellation_pending: bool,
    /// The payment that is not `Failed`, if any.
    pub payment: Option<PaymentView>,
    /// Payments declined so far.
    pub failed_payments: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition.
    pub updated_at: DateTime<Utc>,
}

impl From<&BookingRecord> for BookingView {
    fn from(record: &BookingRecord) -> Self {
        let booking = record.booking();
        Self {
            booking_id: booking.id(),
            package_id: booking.package_id(),
            subject_id: booking.subject_id(),
            seats_requested: booking.seats_requested(),
            travel_date: booking.travel_date(),
            unit_price: booking.unit_price(),
            total_price: booking.total_price(),
            status: booking.status(),
            cancellation_pending: booking.cancellation_requested_by().is_some(),
            payment: record.active_payment().map(PaymentView::from),
            failed_payments: record
                .payments()
                .iter()
                .filter(|p| p.status() == PaymentStatus::Failed)
                .count(),
            created_at: booking.created_at(),
            updated_at: booking.updated_at(),
        }
    }
}

/// Booking counts per status and confirmed revenue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookingReport {
    /// All bookings.
    pub total_bookings: usize,
    /// Bookings awaiting payment.
    pub pending: usize,
    /// Paid bookings that have not travelled yet.
    pub confirmed: usize,
    /// Cancelled bookings.
    pub cancelled: usize,
    /// Travelled bookings.
    pub completed: usize,
    /// Sum of total prices over confirmed and completed bookings.
    pub revenue: Decimal,
}

fn newest_first(mut records: Vec<BookingRecord>) -> Vec<BookingView> {
    records.reverse();
    records.iter().map(BookingView::from).collect()
}

async fn load_visible(
    subject: &Subject,
    booking_id: Uuid,
    ledger: &dyn LedgerStore,
) -> Result<BookingRecord, DomainError> {
    let entry = ledger
        .load(booking_id)
        .await?
        .ok_or(DomainError::BookingNotFound(booking_id))?;
    if !subject.may_act_for(entry.record.booking().subject_id()) {
        return Err(DomainError::Unauthorized {
            subject_id: subject.subject_id,
            action: "view booking",
        });
    }
    Ok(entry.record)
}

/// Retrieves one booking.
///
/// # Errors
///
/// Returns `DomainError::BookingNotFound` for unknown ids and
/// `DomainError::Unauthorized` unless the subject owns the booking or is an
/// administrator.
pub async fn get_booking(
    subject: &Subject,
    booking_id: Uuid,
    ledger: &dyn LedgerStore,
) -> Result<BookingView, DomainError> {
    let record = load_visible(subject, booking_id, ledger).await?;
    Ok(BookingView::from(&record))
}

/// Lists the subject's own bookings, newest first.
///
/// # Errors
///
/// Returns ledger failures.
pub async fn list_my_bookings(
    subject: &Subject,
    ledger: &dyn LedgerStore,
) -> Result<Vec<BookingView>, DomainError> {
    let records = ledger.list_by_subject(subject.subject_id).await?;
    Ok(newest_first(records))
}

/// Lists every booking, newest first.
///
/// # Errors
///
/// Returns `DomainError::Unauthorized` for non-administrators and ledger
/// failures.
pub async fn list_all_bookings(
    subject: &Subject,
    ledger: &dyn LedgerStore,
) -> Result<Vec<BookingView>, DomainError> {
    subject.require_admin("list all bookings")?;
    let records = ledger.list_all().await?;
    Ok(newest_first(records))
}

/// Lists every payment across the subject's bookings, declined ones
/// included, newest first.
///
/// # Errors
///
/// Returns ledger failures.
pub async fn payment_history(
    subject: &Subject,
    ledger: &dyn LedgerStore,
) -> Result<Vec<PaymentView>, DomainError> {
    let records = ledger.list_by_subject(subject.subject_id).await?;
    let mut payments: Vec<PaymentView> = records
        .iter()
        .flat_map(BookingRecord::payments)
        .map(PaymentView::from)
        .collect();
    payments.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.payment_id.cmp(&a.payment_id))
    });
    Ok(payments)
}

/// Returns the committed event history of one booking, oldest first.
///
/// # Errors
///
/// Returns `DomainError::BookingNotFound` for unknown ids and
/// `DomainError::Unauthorized` unless the subject owns the booking or is an
/// administrator.
pub async fn booking_history(
    subject: &Subject,
    booking_id: Uuid,
    ledger: &dyn LedgerStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    load_visible(subject, booking_id, ledger).await?;
    ledger.load_events(booking_id).await
}

/// Summarizes all bookings.
///
/// # Errors
///
/// Returns `DomainError::Unauthorized` for non-administrators and ledger
/// failures.
pub async fn booking_report(
    subject: &Subject,
    ledger: &dyn LedgerStore,
) -> Result<BookingReport, DomainError> {
    subject.require_admin("view booking report")?;
    let records = ledger.list_all().await?;
    let mut report = BookingReport {
        total_bookings: records.len(),
        ..BookingReport::default()
    };
    for record in &records {
        let booking = record.booking();
        match booking.status() {
            BookingStatus::Pending => report.pending += 1,
            BookingStatus::Confirmed => report.confirmed += 1,
            BookingStatus::Cancelled => report.cancelled += 1,
            BookingStatus::Completed => report.completed += 1,
        }
        if matches!(
            booking.status(),
            BookingStatus::Confirmed | BookingStatus::Completed
        ) {
            report.revenue += booking.total_price();
        }
    }
    Ok(report)
}
