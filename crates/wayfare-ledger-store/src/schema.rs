//! Ledger database schema.
//!
//! Mirrors `migrations/0001_create_ledger.sql` so a store can bootstrap a
//! database that is not managed by `sqlx migrate`.

/// SQL to create the booking, booking event, and refund task tables.
pub const CREATE_LEDGER_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS bookings (
    booking_id   UUID PRIMARY KEY,
    package_id   UUID NOT NULL,
    subject_id   UUID NOT NULL,
    travel_date  DATE NOT NULL,
    status       VARCHAR(32) NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    updated_at   TIMESTAMPTZ NOT NULL,
    version      BIGINT NOT NULL,
    record       JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bookings_pending_departure
    ON bookings (package_id, travel_date)
    WHERE status = 'pending';

CREATE INDEX IF NOT EXISTS idx_bookings_subject
    ON bookings (subject_id, created_at);

CREATE TABLE IF NOT EXISTS booking_events (
    event_id        UUID PRIMARY KEY,
    booking_id      UUID NOT NULL REFERENCES bookings (booking_id),
    event_type      VARCHAR(255) NOT NULL,
    payload         JSONB NOT NULL,
    sequence_number BIGINT NOT NULL,
    correlation_id  UUID NOT NULL,
    causation_id    UUID NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (booking_id, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_booking_events_correlation_id
    ON booking_events (correlation_id);

CREATE TABLE IF NOT EXISTS refund_tasks (
    payment_id      UUID PRIMARY KEY,
    booking_id      UUID NOT NULL REFERENCES bookings (booking_id),
    status          VARCHAR(32) NOT NULL,
    enqueued_at     TIMESTAMPTZ NOT NULL,
    next_attempt_at TIMESTAMPTZ NOT NULL,
    task            JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_refund_tasks_due
    ON refund_tasks (next_attempt_at)
    WHERE status = 'waiting';
";
