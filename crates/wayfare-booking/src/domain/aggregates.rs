//! The Booking-Payment state machine.
//!
//! `BookingAggregate` wraps one [`BookingRecord`] and is the only code that
//! changes it. Every transition validates the current (booking, payment)
//! pair, records an event, and applies it; nothing is mutated when
//! validation fails.

use chrono::{NaiveDate, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;
use wayfare_core::aggregate::AggregateRoot;
use wayfare_core::catalog::PackageInfo;
use wayfare_core::clock::Clock;
use wayfare_core::error::DomainError;
use wayfare_core::event::EventMetadata;
use wayfare_core::gateway::{ChargeRequest, PaymentMode};
use wayfare_core::identity::Subject;
use wayfare_core::lifecycle::{BookingStatus, PaymentStatus};

use super::events::{
    AuthorizationRequested, AuthorizationUnresolved, BookingCancelled, BookingCompleted,
    BookingCreated, BookingEvent, BookingEventKind, CancellationRequested, ChargeOrphaned,
    OrphanedChargeRefunded, PaymentAuthorized, PaymentDeclined, PaymentOpened, PaymentRefunded,
};
use super::records::{Booking, BookingRecord, OrphanedCharge, Payment};
use crate::ledger::LedgerEntry;

/// How long an authorization call may stay unanswered before another
/// attempt on the same payment is allowed.
pub const AUTHORIZATION_LEASE_MINUTES: i64 = 10;

/// What a cancellation requires before it can be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelPlan {
    /// No money was taken; the booking can be cancelled right away.
    Direct,
    /// The payment must be refunded first.
    RefundFirst {
        /// The completed payment.
        payment_id: Uuid,
        /// Its gateway reference.
        transaction_ref: String,
    },
}

/// The aggregate root for a booking and its payments.
#[derive(Debug)]
pub struct BookingAggregate {
    record: BookingRecord,
    /// Version the record was loaded at (0 for a new booking).
    version: i64,
    uncommitted_events: Vec<BookingEvent>,
}

impl BookingAggregate {
    /// Creates a pending booking with a pending payment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSeats` when fewer than one seat is requested,
    /// `InvalidTravelDate` for past dates, `PackageUnavailable` when the
    /// package is closed, and `CapacityExceeded` when the seats do not fit.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        booking_id: Uuid,
        payment_id: Uuid,
        subject: &Subject,
        package: &PackageInfo,
        seats_requested: u32,
        travel_date: NaiveDate,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        if seats_requested < 1 {
            return Err(DomainError::InvalidSeats {
                requested: seats_requested,
            });
        }
        let today = clock.today();
        if travel_date < today {
            return Err(DomainError::InvalidTravelDate { travel_date, today });
        }
        if !package.is_available {
            return Err(DomainError::PackageUnavailable(package.id));
        }
        if seats_requested > package.seat_capacity {
            return Err(DomainError::CapacityExceeded {
                package_id: package.id,
                requested: seats_requested,
                capacity: package.seat_capacity,
            });
        }

        let now = clock.now();
        let total_price = package.price * Decimal::from(seats_requested);
        let record = BookingRecord {
            booking: Booking {
                id: booking_id,
                package_id: package.id,
                subject_id: subject.subject_id,
                seats_requested,
                travel_date,
                unit_price: package.price,
                total_price,
                status: BookingStatus::Pending,
                cancellation_requested_by: None,
                created_at: now,
                updated_at: now,
            },
            payments: vec![Payment {
                id: payment_id,
                booking_id,
                amount: total_price,
                status: PaymentStatus::Pending,
                transaction_ref: None,
                mode: PaymentMode::default(),
                authorization_attempts: 0,
                last_gateway_error: None,
                authorization_started_at: None,
                orphaned_charges: Vec::new(),
                created_at: now,
                updated_at: now,
            }],
        };

        let mut aggregate = Self {
            record,
            version: 0,
            uncommitted_events: Vec::new(),
        };
        aggregate.record_event(
            BookingEventKind::BookingCreated(BookingCreated {
                booking_id,
                subject_id: subject.subject_id,
                package_id: package.id,
                seats_requested,
                travel_date,
                unit_price: package.price,
                total_price,
                payment_id,
            }),
            correlation_id,
            clock,
        );
        Ok(aggregate)
    }

    /// Rehydrates the aggregate from a ledger entry.
    #[must_use]
    pub fn from_entry(entry: LedgerEntry) -> Self {
        Self {
            record: entry.record,
            version: entry.version,
            uncommitted_events: Vec::new(),
        }
    }

    /// The current record, including uncommitted changes.
    #[must_use]
    pub fn record(&self) -> &BookingRecord {
        &self.record
    }

    /// Consumes the aggregate, returning the record.
    #[must_use]
    pub fn into_record(self) -> BookingRecord {
        self.record
    }

    /// Decides how a cancellation by `subject` has to proceed.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` unless the subject owns the booking or is an
    /// administrator, and `IllegalTransition` unless the booking is
    /// `Pending` or `Confirmed`.
    pub fn plan_cancellation(&self, subject: &Subject) -> Result<CancelPlan, DomainError> {
        let booking = &self.record.booking;
        if !subject.may_act_for(booking.subject_id) {
            return Err(DomainError::Unauthorized {
                subject_id: subject.subject_id,
                action: "cancel booking",
            });
        }
        if !matches!(
            booking.status,
            BookingStatus::Pending | BookingStatus::Confirmed
        ) {
            return Err(self.illegal("cancel"));
        }
        match self.record.active_payment() {
            Some(payment) if payment.status == PaymentStatus::Completed => {
                let transaction_ref = payment.transaction_ref.clone().ok_or_else(|| {
                    DomainError::Infrastructure(format!(
                        "completed payment {} has no transaction reference",
                        payment.id
                    ))
                })?;
                Ok(CancelPlan::RefundFirst {
                    payment_id: payment.id,
                    transaction_ref,
                })
            }
            _ => Ok(CancelPlan::Direct),
        }
    }

    /// Starts a cancellation. An unpaid booking is cancelled on the spot;
    /// a paid one is marked as waiting for its refund, which blocks
    /// completion until [`Self::cancel_with_refund`] lands.
    pub(crate) fn request_cancellation(
        &mut self,
        subject: &Subject,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<CancelPlan, DomainError> {
        let plan = self.plan_cancellation(subject)?;
        match &plan {
            CancelPlan::Direct => self.cancel(subject, correlation_id, clock)?,
            CancelPlan::RefundFirst { payment_id, .. } => {
                if self.record.booking.cancellation_requested_by.is_none() {
                    let booking_id = self.record.booking.id;
                    self.record_event(
                        BookingEventKind::CancellationRequested(CancellationRequested {
                            booking_id,
                            payment_id: *payment_id,
                            requested_by: subject.subject_id,
                        }),
                        correlation_id,
                        clock,
                    );
                }
            }
        }
        Ok(plan)
    }

    /// Prepares a charge for a pending booking, opening a replacement
    /// payment when the previous one was declined.
    ///
    /// Only one authorization call per payment may be outstanding. A
    /// payment whose last call went unanswered for longer than
    /// [`AUTHORIZATION_LEASE_MINUTES`] may be charged again.
    pub(crate) fn begin_authorization(
        &mut self,
        subject: &Subject,
        mode: PaymentMode,
        replacement_payment_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<ChargeRequest, DomainError> {
        let booking = &self.record.booking;
        if !subject.may_act_for(booking.subject_id) {
            return Err(DomainError::Unauthorized {
                subject_id: subject.subject_id,
                action: "pay for booking",
            });
        }
        if booking.status != BookingStatus::Pending || booking.cancellation_requested_by.is_some() {
            return Err(self.illegal("confirm payment"));
        }

        let now = clock.now();
        let payment_id = match self.record.active_payment() {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                let in_flight = payment.authorization_started_at.is_some_and(|started| {
                    now < started + TimeDelta::minutes(AUTHORIZATION_LEASE_MINUTES)
                });
                if in_flight {
                    return Err(self.illegal("start a second authorization for"));
                }
                payment.id
            }
            Some(_) => return Err(self.illegal("confirm payment")),
            None => {
                let amount = self.record.booking.total_price;
                self.record_event(
                    BookingEventKind::PaymentOpened(PaymentOpened {
                        payment_id: replacement_payment_id,
                        amount,
                    }),
                    correlation_id,
                    clock,
                );
                replacement_payment_id
            }
        };

        self.record_event(
            BookingEventKind::AuthorizationRequested(AuthorizationRequested { payment_id, mode }),
            correlation_id,
            clock,
        );

        Ok(ChargeRequest {
            booking_id: self.record.booking.id,
            payment_id,
            amount: self.record.booking.total_price,
            mode,
        })
    }

    /// `(Pending, Pending) → (Confirmed, Completed)`.
    pub(crate) fn authorization_succeeded(
        &mut self,
        payment_id: Uuid,
        transaction_ref: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_awaiting_authorization(payment_id)?;
        self.record_event(
            BookingEventKind::PaymentAuthorized(PaymentAuthorized {
                payment_id,
                transaction_ref,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// `(Pending, Pending) → (Pending, Failed)`.
    pub(crate) fn authorization_declined(
        &mut self,
        payment_id: Uuid,
        reason: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_awaiting_authorization(payment_id)?;
        self.record_event(
            BookingEventKind::PaymentDeclined(PaymentDeclined { payment_id, reason }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Records an unanswered authorization; both statuses stay as they are.
    pub(crate) fn authorization_unresolved(
        &mut self,
        payment_id: Uuid,
        error: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_awaiting_authorization(payment_id)?;
        self.record_event(
            BookingEventKind::AuthorizationUnresolved(AuthorizationUnresolved {
                payment_id,
                error,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// `(Pending | Confirmed, Pending | Failed | ∅) → (Cancelled, unchanged)`.
    pub(crate) fn cancel(
        &mut self,
        subject: &Subject,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        match self.plan_cancellation(subject)? {
            CancelPlan::Direct => {
                let booking_id = self.record.booking.id;
                self.record_event(
                    BookingEventKind::BookingCancelled(BookingCancelled {
                        booking_id,
                        cancelled_by: subject.subject_id,
                    }),
                    correlation_id,
                    clock,
                );
                Ok(())
            }
            CancelPlan::RefundFirst { .. } => Err(self.illegal("cancel")),
        }
    }

    /// `(Pending | Confirmed, Completed) → (Cancelled, Refunded)`, once the
    /// gateway has refunded `payment_id`.
    pub(crate) fn cancel_with_refund(
        &mut self,
        subject: &Subject,
        payment_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        match self.plan_cancellation(subject)? {
            CancelPlan::RefundFirst {
                payment_id: active,
                transaction_ref,
            } if active == payment_id => {
                let booking_id = self.record.booking.id;
                self.record_event(
                    BookingEventKind::PaymentRefunded(PaymentRefunded {
                        payment_id,
                        transaction_ref,
                    }),
                    correlation_id,
                    clock,
                );
                self.record_event(
                    BookingEventKind::BookingCancelled(BookingCancelled {
                        booking_id,
                        cancelled_by: subject.subject_id,
                    }),
                    correlation_id,
                    clock,
                );
                Ok(())
            }
            _ => Err(self.illegal("cancel")),
        }
    }

    /// `(Confirmed, Completed) → (Completed, Completed)`.
    pub(crate) fn mark_completed(
        &mut self,
        subject: &Subject,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        subject.require_admin("complete booking")?;
        let booking = &self.record.booking;
        let paid = self
            .record
            .active_payment()
            .is_some_and(|p| p.status == PaymentStatus::Completed);
        if booking.status != BookingStatus::Confirmed
            || !paid
            || booking.cancellation_requested_by.is_some()
        {
            return Err(self.illegal("complete"));
        }
        let booking_id = booking.id;
        if clock.today() < booking.travel_date {
            return Err(DomainError::TravelDateNotReached {
                booking_id,
                travel_date: booking.travel_date,
            });
        }
        self.record_event(
            BookingEventKind::BookingCompleted(BookingCompleted {
                booking_id,
                completed_by: subject.subject_id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Records a charge the gateway authorized for `payment_id` that the
    /// payment could not take. Returns `false` when the payment already
    /// holds the charge, in which case nothing is recorded and the charge
    /// must not be refunded.
    pub(crate) fn record_orphaned_charge(
        &mut self,
        payment_id: Uuid,
        transaction_ref: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<bool, DomainError> {
        let payment = self.payment(payment_id)?;
        let kept = payment.status != PaymentStatus::Pending
            && payment.transaction_ref.as_deref() == Some(transaction_ref);
        if kept {
            return Ok(false);
        }
        let known = payment
            .orphaned_charges
            .iter()
            .any(|c| c.transaction_ref == transaction_ref);
        if !known {
            self.record_event(
                BookingEventKind::ChargeOrphaned(ChargeOrphaned {
                    payment_id,
                    transaction_ref: transaction_ref.to_owned(),
                }),
                correlation_id,
                clock,
            );
        }
        Ok(true)
    }

    /// Marks an orphaned charge refunded, recording the orphan first if it
    /// was never written down. Settling twice is a no-op.
    pub(crate) fn settle_orphaned_charge(
        &mut self,
        payment_id: Uuid,
        transaction_ref: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let payment = self.payment(payment_id)?;
        let charge = payment
            .orphaned_charges
            .iter()
            .find(|c| c.transaction_ref == transaction_ref);
        if charge.is_some_and(|c| c.refunded_at.is_some()) {
            return Ok(());
        }
        if charge.is_none() {
            self.record_event(
                BookingEventKind::ChargeOrphaned(ChargeOrphaned {
                    payment_id,
                    transaction_ref: transaction_ref.to_owned(),
                }),
                correlation_id,
                clock,
            );
        }
        self.record_event(
            BookingEventKind::OrphanedChargeRefunded(OrphanedChargeRefunded {
                payment_id,
                transaction_ref: transaction_ref.to_owned(),
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    fn payment(&self, payment_id: Uuid) -> Result<&Payment, DomainError> {
        self.record
            .payments
            .iter()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "booking {} has no payment {payment_id}",
                    self.record.booking.id
                ))
            })
    }

    fn ensure_awaiting_authorization(&self, payment_id: Uuid) -> Result<(), DomainError> {
        let awaiting = self.record.booking.status == BookingStatus::Pending
            && self
                .record
                .active_payment()
                .is_some_and(|p| p.id == payment_id && p.status == PaymentStatus::Pending);
        if awaiting {
            Ok(())
        } else {
            Err(self.illegal("confirm payment"))
        }
    }

    fn illegal(&self, action: &'static str) -> DomainError {
        DomainError::IllegalTransition {
            booking_id: self.record.booking.id,
            action,
            booking_status: self.record.booking.status,
            payment_status: self.record.active_payment().map(Payment::status),
        }
    }

    /// Returns the next sequence number for a new event.
    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn record_event(&mut self, kind: BookingEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let event = BookingEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.record.booking.id,
                sequence_number: self.next_sequence_number(),
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.apply(&event);
        self.uncommitted_events.push(event);
    }
}

impl AggregateRoot for BookingAggregate {
    type Event = BookingEvent;

    fn aggregate_id(&self) -> Uuid {
        self.record.booking.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        let at = event.metadata.occurred_at;
        let booking_id = self.record.booking.id;
        match &event.kind {
            // The record is built by `create`.
            BookingEventKind::BookingCreated(_) => return,
            BookingEventKind::PaymentOpened(payload) => {
                self.record.payments.push(Payment {
                    id: payload.payment_id,
                    booking_id,
                    amount: payload.amount,
                    status: PaymentStatus::Pending,
                    transaction_ref: None,
                    mode: PaymentMode::default(),
                    authorization_attempts: 0,
                    last_gateway_error: None,
                    authorization_started_at: None,
                    orphaned_charges: Vec::new(),
                    created_at: at,
                    updated_at: at,
                });
            }
            BookingEventKind::AuthorizationRequested(payload) => {
                if let Some(payment) = self.record.payment_mut(payload.payment_id) {
                    payment.authorization_attempts += 1;
                    payment.mode = payload.mode;
                    payment.authorization_started_at = Some(at);
                    payment.updated_at = at;
                }
            }
            BookingEventKind::PaymentAuthorized(payload) => {
                if let Some(payment) = self.record.payment_mut(payload.payment_id) {
                    payment.status = PaymentStatus::Completed;
                    payment.transaction_ref = Some(payload.transaction_ref.clone());
                    payment.last_gateway_error = None;
                    payment.authorization_started_at = None;
                    payment.updated_at = at;
                }
                self.record.booking.status = BookingStatus::Confirmed;
            }
            BookingEventKind::PaymentDeclined(payload) => {
                if let Some(payment) = self.record.payment_mut(payload.payment_id) {
                    payment.status = PaymentStatus::Failed;
                    payment.last_gateway_error = Some(payload.reason.clone());
                    payment.authorization_started_at = None;
                    payment.updated_at = at;
                }
            }
            BookingEventKind::AuthorizationUnresolved(payload) => {
                if let Some(payment) = self.record.payment_mut(payload.payment_id) {
                    payment.last_gateway_error = Some(payload.error.clone());
                    payment.authorization_started_at = None;
                    payment.updated_at = at;
                }
            }
            BookingEventKind::PaymentRefunded(payload) => {
                if let Some(payment) = self.record.payment_mut(payload.payment_id) {
                    payment.status = PaymentStatus::Refunded;
                    payment.updated_at = at;
                }
            }
            BookingEventKind::BookingCancelled(_) => {
                self.record.booking.status = BookingStatus::Cancelled;
                self.record.booking.cancellation_requested_by = None;
            }
            BookingEventKind::BookingCompleted(_) => {
                self.record.booking.status = BookingStatus::Completed;
            }
            BookingEventKind::CancellationRequested(payload) => {
                self.record.booking.cancellation_requested_by = Some(payload.requested_by);
            }
            // Orphaned charges are bookkeeping on the payment; the booking's
            // own timestamp only tracks status transitions.
            BookingEventKind::ChargeOrphaned(payload) => {
                if let Some(payment) = self.record.payment_mut(payload.payment_id) {
                    payment.authorization_started_at = None;
                    payment.orphaned_charges.push(OrphanedCharge {
                        transaction_ref: payload.transaction_ref.clone(),
                        recorded_at: at,
                        refunded_at: None,
                    });
                }
                return;
            }
            BookingEventKind::OrphanedChargeRefunded(payload) => {
                if let Some(charge) = self
                    .record
                    .payment_mut(payload.payment_id)
                    .and_then(|p| {
                        p.orphaned_charges
                            .iter_mut()
                            .find(|c| c.transaction_ref == payload.transaction_ref)
                    })
                {
                    charge.refunded_at = Some(at);
                }
                return;
            }
        }
        self.record.booking.updated_at = at;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
