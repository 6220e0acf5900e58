//! The group matching engine.
//!
//! Reads the pending demand for one departure and runs the greedy
//! selection over it. Matching never mutates bookings.

use tracing::{debug, info};
use wayfare_booking::ledger::{DepartureKey, LedgerStore};
use wayfare_core::catalog::CatalogLookup;
use wayfare_core::error::DomainError;

use crate::domain::selection::{Candidate, MatchOutcome, select_group};

/// Computes a departure group for `key`.
///
/// The seat cap is `capacity_override` when given, otherwise the package's
/// configured capacity. Packages that are closed for new bookings are still
/// matched.
///
/// # Errors
///
/// Returns `DomainError::PackageNotFound` if the catalog does not know the
/// package, and catalog or ledger failures.
pub async fn find_match(
    key: DepartureKey,
    capacity_override: Option<u32>,
    catalog: &dyn CatalogLookup,
    ledger: &dyn LedgerStore,
) -> Result<MatchOutcome, DomainError> {
    let package = catalog
        .get_package(key.package_id)
        .await?
        .ok_or(DomainError::PackageNotFound(key.package_id))?;
    let capacity = capacity_override.unwrap_or(package.seat_capacity);

    let candidates: Vec<Candidate> = ledger
        .pending_for_departure(key)
        .await?
        .iter()
        .filter_map(|record| Candidate::from_record(record, key))
        .collect();
    debug!(
        package_id = %key.package_id,
        travel_date = %key.travel_date,
        candidates = candidates.len(),
        capacity,
        "matching departure"
    );

    let outcome = select_group(key, candidates, capacity);
    match &outcome {
        MatchOutcome::Matched(result) => info!(
            package_id = %key.package_id,
            travel_date = %key.travel_date,
            bookings = result.booking_ids.len(),
            seats = result.seats_total,
            capacity,
            "departure group formed"
        ),
        MatchOutcome::NoMatch => debug!(
            package_id = %key.package_id,
            travel_date = %key.travel_date,
            "no departure group"
        ),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;
    use wayfare_booking::application::command_handlers::{
        handle_cancel_booking, handle_confirm_payment, handle_create_booking,
    };
    use wayfare_booking::application::refund_queue::RefundRetryQueue;
    use wayfare_booking::domain::commands::{CancelBooking, ConfirmPayment, CreateBooking};
    use wayfare_booking::ledger::InMemoryLedgerStore;
    use wayfare_core::gateway::PaymentMode;
    use wayfare_core::identity::Subject;
    use wayfare_test_support::{InMemoryCatalog, ScriptedGateway, SteppingClock};

    use super::*;

    fn travel_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn clock() -> SteppingClock {
        SteppingClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            TimeDelta::seconds(1),
        )
    }

    async fn book(
        clock: &SteppingClock,
        catalog: &InMemoryCatalog,
        ledger: &InMemoryLedgerStore,
        package_id: Uuid,
        travel_date: NaiveDate,
        seats: u32,
    ) -> Uuid {
        handle_create_booking(
            &CreateBooking {
                correlation_id: Uuid::new_v4(),
                subject: Subject::user(Uuid::new_v4()),
                package_id,
                seats_requested: seats,
                travel_date,
            },
            clock,
            catalog,
            ledger,
        )
        .await
        .unwrap()
        .aggregate_id
    }

    #[tokio::test]
    async fn test_matches_pending_bookings_under_package_capacity() {
        // Arrange
        let clock = clock();
        let catalog = InMemoryCatalog::new();
        let ledger = InMemoryLedgerStore::new();
        let package_id = catalog.add_package(Decimal::from(80), 10);
        for seats in [3, 5, 2, 6] {
            book(&clock, &catalog, &ledger, package_id, travel_date(), seats).await;
        }
        let key = DepartureKey {
            package_id,
            travel_date: travel_date(),
        };

        // Act
        let outcome = find_match(key, None, &catalog, &ledger).await.unwrap();

        // Assert
        let result = outcome.as_matched().unwrap();
        assert_eq!(result.seats_total, 10);
        assert_eq!(result.capacity, 10);
        assert_eq!(result.booking_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_capacity_override_replaces_package_capacity() {
        let clock = clock();
        let catalog = InMemoryCatalog::new();
        let ledger = InMemoryLedgerStore::new();
        let package_id = catalog.add_package(Decimal::from(80), 10);
        book(&clock, &catalog, &ledger, package_id, travel_date(), 3).await;
        book(&clock, &catalog, &ledger, package_id, travel_date(), 4).await;
        let key = DepartureKey {
            package_id,
            travel_date: travel_date(),
        };

        let outcome = find_match(key, Some(4), &catalog, &ledger).await.unwrap();

        let result = outcome.as_matched().unwrap();
        assert_eq!(result.capacity, 4);
        assert_eq!(result.seats_total, 3);
    }

    #[tokio::test]
    async fn test_only_pending_bookings_on_the_same_day_are_considered() {
        // Arrange
        let clock = clock();
        let catalog = InMemoryCatalog::new();
        let ledger = InMemoryLedgerStore::new();
        let gateway = ScriptedGateway::new();
        let refunds = RefundRetryQueue::default();
        let package_id = catalog.add_package(Decimal::from(80), 10);
        let pending = book(&clock, &catalog, &ledger, package_id, travel_date(), 2).await;
        let next_day = travel_date().succ_opt().unwrap();
        book(&clock, &catalog, &ledger, package_id, next_day, 2).await;
        let admin = Subject::admin(Uuid::new_v4());
        let paid = book(&clock, &catalog, &ledger, package_id, travel_date(), 1).await;
        handle_confirm_payment(
            &ConfirmPayment {
                correlation_id: Uuid::new_v4(),
                subject: admin,
                booking_id: paid,
                mode: PaymentMode::Auto,
            },
            &clock,
            &ledger,
            &gateway,
            &refunds,
        )
        .await
        .unwrap();
        let dropped = book(&clock, &catalog, &ledger, package_id, travel_date(), 1).await;
        handle_cancel_booking(
            &CancelBooking {
                correlation_id: Uuid::new_v4(),
                subject: admin,
                booking_id: dropped,
            },
            &clock,
            &ledger,
            &gateway,
            &refunds,
        )
        .await
        .unwrap();
        let key = DepartureKey {
            package_id,
            travel_date: travel_date(),
        };

        // Act
        let outcome = find_match(key, None, &catalog, &ledger).await.unwrap();

        // Assert
        assert_eq!(outcome.as_matched().unwrap().booking_ids, vec![pending]);
    }

    #[tokio::test]
    async fn test_no_demand_is_no_match() {
        let catalog = InMemoryCatalog::new();
        let ledger = InMemoryLedgerStore::new();
        let package_id = catalog.add_package(Decimal::from(80), 10);
        let key = DepartureKey {
            package_id,
            travel_date: travel_date(),
        };

        let outcome = find_match(key, None, &catalog, &ledger).await.unwrap();

        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[tokio::test]
    async fn test_unknown_package_is_not_found() {
        let catalog = InMemoryCatalog::new();
        let ledger = InMemoryLedgerStore::new();
        let key = DepartureKey {
            package_id: Uuid::new_v4(),
            travel_date: travel_date(),
        };

        let result = find_match(key, None, &catalog, &ledger).await;

        assert!(matches!(result, Err(DomainError::PackageNotFound(id)) if id == key.package_id));
    }

    #[tokio::test]
    async fn test_withdrawn_package_is_still_matched() {
        let clock = clock();
        let catalog = InMemoryCatalog::new();
        let ledger = InMemoryLedgerStore::new();
        let package_id = catalog.add_package(Decimal::from(80), 10);
        book(&clock, &catalog, &ledger, package_id, travel_date(), 2).await;
        catalog.withdraw(package_id);
        let key = DepartureKey {
            package_id,
            travel_date: travel_date(),
        };

        let outcome = find_match(key, None, &catalog, &ledger).await.unwrap();

        assert_eq!(outcome.as_matched().unwrap().seats_total, 2);
    }
}
