//! In-process `LedgerStore`.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;
use wayfare_core::error::DomainError;
use wayfare_core::event::StoredEvent;
use wayfare_core::lifecycle::BookingStatus;

use super::{DepartureKey, LedgerEntry, LedgerStore};
use crate::domain::records::BookingRecord;
use crate::domain::refunds::RefundTask;

#[derive(Debug)]
struct Slot {
    record: BookingRecord,
    events: Vec<StoredEvent>,
}

impl Slot {
    #[allow(clippy::cast_possible_wrap)]
    fn version(&self) -> i64 {
        self.events.len() as i64
    }
}

/// A ledger held in process memory. Suitable for a single node and tests.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    slots: RwLock<HashMap<Uuid, Slot>>,
    refund_tasks: RwLock<HashMap<Uuid, RefundTask>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered<F>(&self, keep: F) -> Result<Vec<BookingRecord>, DomainError>
    where
        F: Fn(&BookingRecord) -> bool,
    {
        let slots = self.slots.read().map_err(poisoned)?;
        let mut records: Vec<BookingRecord> = slots
            .values()
            .map(|slot| &slot.record)
            .filter(|record| keep(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (a.booking().created_at(), a.booking().id())
                .cmp(&(b.booking().created_at(), b.booking().id()))
        });
        Ok(records)
    }
}

fn poisoned<T>(_: T) -> DomainError {
    DomainError::Infrastructure("ledger lock poisoned".into())
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(
        &self,
        record: &BookingRecord,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        let booking_id = record.booking().id();
        let mut slots = self.slots.write().map_err(poisoned)?;
        if let Some(existing) = slots.get(&booking_id) {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: booking_id,
                expected: 0,
                actual: existing.version(),
            });
        }
        let slot = Slot {
            record: record.clone(),
            events: events.to_vec(),
        };
        let version = slot.version();
        slots.insert(booking_id, slot);
        Ok(version)
    }

    async fn load(&self, booking_id: Uuid) -> Result<Option<LedgerEntry>, DomainError> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots.get(&booking_id).map(|slot| LedgerEntry {
            record: slot.record.clone(),
            version: slot.version(),
        }))
    }

    async fn commit(
        &self,
        record: &BookingRecord,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        let booking_id = record.booking().id();
        let mut slots = self.slots.write().map_err(poisoned)?;
        let slot = slots
            .get_mut(&booking_id)
            .ok_or(DomainError::BookingNotFound(booking_id))?;
        let actual = slot.version();
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: booking_id,
                expected: expected_version,
                actual,
            });
        }
        slot.record = record.clone();
        slot.events.extend_from_slice(events);
        Ok(slot.version())
    }

    async fn pending_for_departure(
        &self,
        key: DepartureKey,
    ) -> Result<Vec<BookingRecord>, DomainError> {
        self.filtered(|record| {
            let booking = record.booking();
            booking.status() == BookingStatus::Pending
                && booking.package_id() == key.package_id
                && booking.travel_date() == key.travel_date
        })
    }

    async fn pending_departures(&self) -> Result<Vec<DepartureKey>, DomainError> {
        let slots = self.slots.read().map_err(poisoned)?;
        let keys: BTreeSet<DepartureKey> = slots
            .values()
            .map(|slot| slot.record.booking())
            .filter(|booking| booking.status() == BookingStatus::Pending)
            .map(|booking| DepartureKey {
                package_id: booking.package_id(),
                travel_date: booking.travel_date(),
            })
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn list_by_subject(&self, subject_id: Uuid) -> Result<Vec<BookingRecord>, DomainError> {
        self.filtered(|record| record.booking().subject_id() == subject_id)
    }

    async fn list_all(&self) -> Result<Vec<BookingRecord>, DomainError> {
        self.filtered(|_| true)
    }

    async fn load_events(&self, booking_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots
            .get(&booking_id)
            .map(|slot| slot.events.clone())
            .unwrap_or_default())
    }

    async fn save_refund_task(&self, task: &RefundTask) -> Result<(), DomainError> {
        let mut tasks = self.refund_tasks.write().map_err(poisoned)?;
        tasks.insert(task.payment_id, task.clone());
        Ok(())
    }

    async fn load_refund_task(&self, payment_id: Uuid) -> Result<Option<RefundTask>, DomainError> {
        let tasks = self.refund_tasks.read().map_err(poisoned)?;
        Ok(tasks.get(&payment_id).cloned())
    }

    async fn list_refund_tasks(&self) -> Result<Vec<RefundTask>, DomainError> {
        let tasks = self.refund_tasks.read().map_err(poisoned)?;
        let mut all: Vec<RefundTask> = tasks.values().cloned().collect();
        all.sort_by_key(|t| (t.enqueued_at, t.payment_id));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use wayfare_core::aggregate::AggregateRoot;
    use wayfare_core::catalog::PackageInfo;
    use wayfare_core::identity::Subject;
    use wayfare_test_support::FixedClock;

    use crate::domain::aggregates::BookingAggregate;
    use crate::domain::refunds::{RefundReason, RefundTaskStatus};

    fn new_booking(package_id: Uuid, subject_id: Uuid, travel_date: NaiveDate) -> BookingAggregate {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        let package = PackageInfo {
            id: package_id,
            price: Decimal::from(50),
            seat_capacity: 8,
            is_available: true,
        };
        BookingAggregate::create(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &Subject::user(subject_id),
            &package,
            2,
            travel_date,
            Uuid::new_v4(),
            &clock,
        )
        .unwrap()
    }

    fn stored(aggregate: &BookingAggregate) -> Vec<StoredEvent> {
        aggregate
            .uncommitted_events()
            .iter()
            .map(StoredEvent::from_event)
            .collect()
    }

    fn march_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_load_returns_record_at_event_version() {
        // Arrange
        let ledger = InMemoryLedgerStore::new();
        let aggregate = new_booking(Uuid::new_v4(), Uuid::new_v4(), march_first());
        let booking_id = aggregate.aggregate_id();

        // Act
        let version = ledger
            .insert(aggregate.record(), &stored(&aggregate))
            .await
            .unwrap();
        let entry = ledger.load(booking_id).await.unwrap().unwrap();

        // Assert
        assert_eq!(version, 1);
        assert_eq!(entry.version, 1);
        assert_eq!(&entry.record, aggregate.record());
        assert_eq!(ledger.load_events(booking_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_twice_conflicts() {
        let ledger = InMemoryLedgerStore::new();
        let aggregate = new_booking(Uuid::new_v4(), Uuid::new_v4(), march_first());
        ledger
            .insert(aggregate.record(), &stored(&aggregate))
            .await
            .unwrap();

        let result = ledger.insert(aggregate.record(), &stored(&aggregate)).await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { expected: 0, actual: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_commit_with_stale_version_conflicts() {
        // Arrange
        let ledger = InMemoryLedgerStore::new();
        let aggregate = new_booking(Uuid::new_v4(), Uuid::new_v4(), march_first());
        ledger
            .insert(aggregate.record(), &stored(&aggregate))
            .await
            .unwrap();

        // Act
        let result = ledger.commit(aggregate.record(), 0, &[]).await;

        // Assert
        match result {
            Err(DomainError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_commit_unknown_booking_is_not_found() {
        let ledger = InMemoryLedgerStore::new();
        let aggregate = new_booking(Uuid::new_v4(), Uuid::new_v4(), march_first());

        let result = ledger.commit(aggregate.record(), 1, &[]).await;

        assert!(matches!(result, Err(DomainError::BookingNotFound(_))));
    }

    #[tokio::test]
    async fn test_pending_for_departure_matches_package_and_date_exactly() {
        // Arrange
        let ledger = InMemoryLedgerStore::new();
        let package_id = Uuid::new_v4();
        let other_day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let wanted = new_booking(package_id, Uuid::new_v4(), march_first());
        let wrong_day = new_booking(package_id, Uuid::new_v4(), other_day);
        let wrong_package = new_booking(Uuid::new_v4(), Uuid::new_v4(), march_first());
        for aggregate in [&wanted, &wrong_day, &wrong_package] {
            ledger
                .insert(aggregate.record(), &stored(aggregate))
                .await
                .unwrap();
        }

        // Act
        let pending = ledger
            .pending_for_departure(DepartureKey {
                package_id,
                travel_date: march_first(),
            })
            .await
            .unwrap();
        let departures = ledger.pending_departures().await.unwrap();

        // Assert
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].booking().id(), wanted.aggregate_id());
        assert_eq!(departures.len(), 3);
    }

    #[tokio::test]
    async fn test_list_by_subject_returns_only_owned_bookings() {
        let ledger = InMemoryLedgerStore::new();
        let owner = Uuid::new_v4();
        let mine = new_booking(Uuid::new_v4(), owner, march_first());
        let theirs = new_booking(Uuid::new_v4(), Uuid::new_v4(), march_first());
        for aggregate in [&mine, &theirs] {
            ledger
                .insert(aggregate.record(), &stored(aggregate))
                .await
                .unwrap();
        }

        let owned = ledger.list_by_subject(owner).await.unwrap();
        let all = ledger.list_all().await.unwrap();

        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].booking().subject_id(), owner);
        assert_eq!(all.len(), 2);
    }

    fn refund_task(enqueued_minute: u32) -> RefundTask {
        let enqueued_at = Utc.with_ymd_and_hms(2026, 1, 15, 10, enqueued_minute, 0).unwrap();
        RefundTask {
            booking_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            transaction_ref: "txn_1".into(),
            reason: RefundReason::OrphanedCharge,
            status: RefundTaskStatus::Waiting,
            attempts: 1,
            last_error: "gateway timeout".into(),
            enqueued_at,
            next_attempt_at: enqueued_at,
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_refund_tasks_are_upserted_by_payment_and_listed_oldest_first() {
        // Arrange
        let ledger = InMemoryLedgerStore::new();
        let newer = refund_task(30);
        let mut older = refund_task(5);
        ledger.save_refund_task(&newer).await.unwrap();
        ledger.save_refund_task(&older).await.unwrap();

        // Act
        older.attempts = 2;
        older.status = RefundTaskStatus::Escalated;
        ledger.save_refund_task(&older).await.unwrap();
        let listed = ledger.list_refund_tasks().await.unwrap();

        // Assert
        assert_eq!(listed, vec![older.clone(), newer]);
        assert_eq!(
            ledger.load_refund_task(older.payment_id).await.unwrap(),
            Some(older)
        );
        assert!(ledger.load_refund_task(Uuid::new_v4()).await.unwrap().is_none());
    }
}
