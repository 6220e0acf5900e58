//! `PostgreSQL` implementation of the `LedgerStore` trait.
//!
//! Each booking is one row holding the record as JSONB next to the columns
//! the queries filter on. The row's `version` column is the compare-and-swap
//! token; the event history lives in `booking_events` and is written in the
//! same transaction as the snapshot. Refund tasks are kept in
//! `refund_tasks`, one row per payment.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;
use wayfare_booking::domain::records::BookingRecord;
use wayfare_booking::domain::refunds::RefundTask;
use wayfare_booking::ledger::{DepartureKey, LedgerEntry, LedgerStore};
use wayfare_core::error::DomainError;
use wayfare_core::event::StoredEvent;
use wayfare_core::lifecycle::BookingStatus;

use crate::schema::CREATE_LEDGER_TABLES;

/// PostgreSQL-backed ledger.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

fn db_error(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {err}"))
}

fn decode_record(row: &PgRow) -> Result<BookingRecord, DomainError> {
    let value: serde_json::Value = row.try_get("record").map_err(db_error)?;
    serde_json::from_value(value)
        .map_err(|e| DomainError::Infrastructure(format!("booking record deserialization failed: {e}")))
}

fn decode_records(rows: &[PgRow]) -> Result<Vec<BookingRecord>, DomainError> {
    rows.iter().map(decode_record).collect()
}

fn encode_record(record: &BookingRecord) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(record)
        .map_err(|e| DomainError::Infrastructure(format!("booking record serialization failed: {e}")))
}

fn decode_task(row: &PgRow) -> Result<RefundTask, DomainError> {
    let value: serde_json::Value = row.try_get("task").map_err(db_error)?;
    serde_json::from_value(value)
        .map_err(|e| DomainError::Infrastructure(format!("refund task deserialization failed: {e}")))
}

fn version_after(expected_version: i64, events: &[StoredEvent]) -> Result<i64, DomainError> {
    let added = i64::try_from(events.len())
        .map_err(|_| DomainError::Infrastructure("too many events in one commit".into()))?;
    Ok(expected_version + added)
}

impl PgLedgerStore {
    /// Creates a new `PgLedgerStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the ledger tables if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the statements fail.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_LEDGER_TABLES)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
    ) -> Result<Option<i64>, DomainError> {
        let row = sqlx::query("SELECT version FROM bookings WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error)?;
        row.map(|r| r.try_get::<i64, _>("version").map_err(db_error))
            .transpose()
    }

    async fn append_events(
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        for event in events {
            sqlx::query(
                r"INSERT INTO booking_events
                    (event_id, booking_id, event_type, payload, sequence_number,
                     correlation_id, causation_id, occurred_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(event.event_id)
            .bind(booking_id)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.sequence_number)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(event.occurred_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert(
        &self,
        record: &BookingRecord,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        let booking = record.booking();
        let booking_id = booking.id();
        let version = version_after(0, events)?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let inserted = sqlx::query(
            r"INSERT INTO bookings
                (booking_id, package_id, subject_id, travel_date, status,
                 created_at, updated_at, version, record)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
              ON CONFLICT (booking_id) DO NOTHING",
        )
        .bind(booking_id)
        .bind(booking.package_id())
        .bind(booking.subject_id())
        .bind(booking.travel_date())
        .bind(booking.status().as_str())
        .bind(booking.created_at())
        .bind(booking.updated_at())
        .bind(version)
        .bind(encode_record(record)?)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if inserted.rows_affected() == 0 {
            let actual = Self::current_version(&mut tx, booking_id)
                .await?
                .unwrap_or_default();
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: booking_id,
                expected: 0,
                actual,
            });
        }

        Self::append_events(&mut tx, booking_id, events).await?;
        tx.commit().await.map_err(db_error)?;
        debug!(booking_id = %booking_id, version, "booking inserted");
        Ok(version)
    }

    async fn load(&self, booking_id: Uuid) -> Result<Option<LedgerEntry>, DomainError> {
        let row = sqlx::query("SELECT record, version FROM bookings WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(|row| {
            Ok(LedgerEntry {
                record: decode_record(&row)?,
                version: row.try_get("version").map_err(db_error)?,
            })
        })
        .transpose()
    }

    async fn commit(
        &self,
        record: &BookingRecord,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        let booking = record.booking();
        let booking_id = booking.id();
        let version = version_after(expected_version, events)?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let updated = sqlx::query(
            r"UPDATE bookings
                 SET status = $2, updated_at = $3, version = $4, record = $5
               WHERE booking_id = $1 AND version = $6",
        )
        .bind(booking_id)
        .bind(booking.status().as_str())
        .bind(booking.updated_at())
        .bind(version)
        .bind(encode_record(record)?)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            return match Self::current_version(&mut tx, booking_id).await? {
                None => Err(DomainError::BookingNotFound(booking_id)),
                Some(actual) => Err(DomainError::ConcurrencyConflict {
                    aggregate_id: booking_id,
                    expected: expected_version,
                    actual,
                }),
            };
        }

        Self::append_events(&mut tx, booking_id, events).await?;
        tx.commit().await.map_err(db_error)?;
        debug!(booking_id = %booking_id, version, "booking committed");
        Ok(version)
    }

    async fn pending_for_departure(
        &self,
        key: DepartureKey,
    ) -> Result<Vec<BookingRecord>, DomainError> {
        let rows = sqlx::query(
            r"SELECT record FROM bookings
               WHERE package_id = $1 AND travel_date = $2 AND status = $3
               ORDER BY created_at, booking_id",
        )
        .bind(key.package_id)
        .bind(key.travel_date)
        .bind(BookingStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        decode_records(&rows)
    }

    async fn pending_departures(&self) -> Result<Vec<DepartureKey>, DomainError> {
        let rows = sqlx::query(
            r"SELECT DISTINCT package_id, travel_date FROM bookings
               WHERE status = $1
               ORDER BY package_id, travel_date",
        )
        .bind(BookingStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter()
            .map(|row| {
                Ok(DepartureKey {
                    package_id: row.try_get("package_id").map_err(db_error)?,
                    travel_date: row.try_get("travel_date").map_err(db_error)?,
                })
            })
            .collect()
    }

    async fn list_by_subject(&self, subject_id: Uuid) -> Result<Vec<BookingRecord>, DomainError> {
        let rows = sqlx::query(
            r"SELECT record FROM bookings
               WHERE subject_id = $1
               ORDER BY created_at, booking_id",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        decode_records(&rows)
    }

    async fn list_all(&self) -> Result<Vec<BookingRecord>, DomainError> {
        let rows = sqlx::query("SELECT record FROM bookings ORDER BY created_at, booking_id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        decode_records(&rows)
    }

    async fn load_events(&self, booking_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(
            r"SELECT event_id, booking_id, event_type, payload, sequence_number,
                     correlation_id, causation_id, occurred_at
                FROM booking_events
               WHERE booking_id = $1
               ORDER BY sequence_number",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter()
            .map(|row| {
                Ok(StoredEvent {
                    event_id: row.try_get("event_id").map_err(db_error)?,
                    aggregate_id: row.try_get("booking_id").map_err(db_error)?,
                    event_type: row.try_get("event_type").map_err(db_error)?,
                    payload: row.try_get("payload").map_err(db_error)?,
                    sequence_number: row.try_get("sequence_number").map_err(db_error)?,
                    correlation_id: row.try_get("correlation_id").map_err(db_error)?,
                    causation_id: row.try_get("causation_id").map_err(db_error)?,
                    occurred_at: row.try_get("occurred_at").map_err(db_error)?,
                })
            })
            .collect()
    }

    async fn save_refund_task(&self, task: &RefundTask) -> Result<(), DomainError> {
        let value = serde_json::to_value(task)
            .map_err(|e| DomainError::Infrastructure(format!("refund task serialization failed: {e}")))?;
        sqlx::query(
            r"INSERT INTO refund_tasks
                (payment_id, booking_id, status, enqueued_at, next_attempt_at, task)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (payment_id) DO UPDATE
                 SET status = EXCLUDED.status,
                     next_attempt_at = EXCLUDED.next_attempt_at,
                     task = EXCLUDED.task",
        )
        .bind(task.payment_id)
        .bind(task.booking_id)
        .bind(task.status.as_str())
        .bind(task.enqueued_at)
        .bind(task.next_attempt_at)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        debug!(payment_id = %task.payment_id, status = task.status.as_str(), "refund task saved");
        Ok(())
    }

    async fn load_refund_task(&self, payment_id: Uuid) -> Result<Option<RefundTask>, DomainError> {
        let row = sqlx::query("SELECT task FROM refund_tasks WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(decode_task).transpose()
    }

    async fn list_refund_tasks(&self) -> Result<Vec<RefundTask>, DomainError> {
        let rows = sqlx::query("SELECT task FROM refund_tasks ORDER BY enqueued_at, payment_id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter().map(decode_task).collect()
    }
}
