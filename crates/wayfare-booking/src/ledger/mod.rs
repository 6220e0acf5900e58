//! Ledger store contract.
//!
//! The ledger is the durable home of booking records. Writes are
//! compare-and-swap on a per-booking version: `commit` only succeeds when
//! the stored version still equals the version the caller read.
//!
//! Refund tasks live beside the records so that a refund waiting on the
//! gateway outlives the process that parked it.

mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_core::error::DomainError;
use wayfare_core::event::StoredEvent;

use crate::domain::records::BookingRecord;
use crate::domain::refunds::RefundTask;

pub use memory::InMemoryLedgerStore;

/// A booking record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The record.
    pub record: BookingRecord,
    /// Number of events committed for the record.
    pub version: i64,
}

/// A (package, travel date) pair. Bookings sharing one depart together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepartureKey {
    /// The package.
    pub package_id: Uuid,
    /// The departure date.
    pub travel_date: NaiveDate,
}

/// Durable storage for booking records and their event history.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Stores a new record at the version implied by `events`.
    ///
    /// Fails with `ConcurrencyConflict` if the booking already exists.
    async fn insert(
        &self,
        record: &BookingRecord,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError>;

    /// Loads a record with its current version.
    async fn load(&self, booking_id: Uuid) -> Result<Option<LedgerEntry>, DomainError>;

    /// Replaces a record if its version still equals `expected_version`,
    /// appending `events` to its history. Returns the new version.
    async fn commit(
        &self,
        record: &BookingRecord,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError>;

    /// All `Pending` bookings for one departure.
    async fn pending_for_departure(
        &self,
        key: DepartureKey,
    ) -> Result<Vec<BookingRecord>, DomainError>;

    /// Every departure with at least one `Pending` booking.
    async fn pending_departures(&self) -> Result<Vec<DepartureKey>, DomainError>;

    /// Every booking owned by `subject_id`.
    async fn list_by_subject(&self, subject_id: Uuid) -> Result<Vec<BookingRecord>, DomainError>;

    /// Every booking.
    async fn list_all(&self) -> Result<Vec<BookingRecord>, DomainError>;

    /// The committed event history of one booking, in sequence order.
    async fn load_events(&self, booking_id: Uuid) -> Result<Vec<StoredEvent>, DomainError>;

    /// Inserts or replaces the refund task for `task.payment_id`.
    async fn save_refund_task(&self, task: &RefundTask) -> Result<(), DomainError>;

    /// The refund task for one payment.
    async fn load_refund_task(&self, payment_id: Uuid) -> Result<Option<RefundTask>, DomainError>;

    /// Every refund task, oldest first.
    async fn list_refund_tasks(&self) -> Result<Vec<RefundTask>, DomainError>;
}
