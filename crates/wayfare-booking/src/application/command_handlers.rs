//! Command handlers for the booking context.
//!
//! Each handler loads the aggregate, runs one transition, and commits the
//! resulting record and events with a version check. A version collision is
//! retried once against freshly loaded state; a second collision surfaces as
//! `ConcurrentModification`.
//!
//! Gateway calls never happen while a transition is in flight: the handler
//! commits the state that announces the call, talks to the gateway, then
//! reloads and re-validates before committing the outcome.

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use wayfare_core::aggregate::AggregateRoot;
use wayfare_core::catalog::CatalogLookup;
use wayfare_core::clock::Clock;
use wayfare_core::error::DomainError;
use wayfare_core::event::StoredEvent;
use wayfare_core::gateway::{AuthorizeOutcome, ChargeRequest, PaymentGateway, RefundOutcome};
use wayfare_core::identity::Subject;

use super::refund_queue::{FailedRefund, RefundReason, RefundRetryQueue, refund_recorded};
use crate::domain::aggregates::{BookingAggregate, CancelPlan};
use crate::domain::commands::{CancelBooking, ConfirmPayment, CreateBooking, MarkCompleted};
use crate::domain::records::BookingRecord;
use crate::ledger::LedgerStore;

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct BookingCommandResult {
    /// The booking affected by the command.
    pub aggregate_id: Uuid,
    /// The record as committed.
    pub record: BookingRecord,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

/// A committed transition together with the value it produced.
#[derive(Debug)]
pub(crate) struct Committed<T> {
    pub(crate) record: BookingRecord,
    pub(crate) stored_events: Vec<StoredEvent>,
    pub(crate) output: T,
}

impl<T> Committed<T> {
    fn into_result(self) -> BookingCommandResult {
        BookingCommandResult {
            aggregate_id: self.record.booking().id(),
            record: self.record,
            stored_events: self.stored_events,
        }
    }
}

fn to_stored_events(aggregate: &BookingAggregate) -> Vec<StoredEvent> {
    aggregate
        .uncommitted_events()
        .iter()
        .map(StoredEvent::from_event)
        .collect()
}

/// Loads the booking, applies `transition`, and commits the outcome.
///
/// On a version collision the booking is reloaded and `transition` runs
/// again against the fresh state, so source-state checks are repeated.
///
/// # Errors
///
/// Returns `BookingNotFound` for unknown bookings, whatever `transition`
/// rejects with, `ConcurrentModification` after a second collision, and
/// ledger failures.
pub(crate) async fn commit_transition<T, F>(
    ledger: &dyn LedgerStore,
    booking_id: Uuid,
    mut transition: F,
) -> Result<Committed<T>, DomainError>
where
    F: FnMut(&mut BookingAggregate) -> Result<T, DomainError> + Send,
    T: Send,
{
    let mut collided = false;
    loop {
        let entry = ledger
            .load(booking_id)
            .await?
            .ok_or(DomainError::BookingNotFound(booking_id))?;
        let mut aggregate = BookingAggregate::from_entry(entry);
        let output = transition(&mut aggregate)?;
        let stored_events = to_stored_events(&aggregate);

        if stored_events.is_empty() {
            return Ok(Committed {
                record: aggregate.into_record(),
                stored_events,
                output,
            });
        }

        match ledger
            .commit(aggregate.record(), aggregate.version(), &stored_events)
            .await
        {
            Ok(version) => {
                debug!(booking_id = %booking_id, version, "transition committed");
                aggregate.clear_uncommitted_events();
                return Ok(Committed {
                    record: aggregate.into_record(),
                    stored_events,
                    output,
                });
            }
            Err(DomainError::ConcurrencyConflict { .. }) if !collided => {
                debug!(booking_id = %booking_id, "version collision, retrying once");
                collided = true;
            }
            Err(DomainError::ConcurrencyConflict { .. }) => {
                warn!(booking_id = %booking_id, "second version collision");
                return Err(DomainError::ConcurrentModification(booking_id));
            }
            Err(other) => return Err(other),
        }
    }
}

/// Handles the `CreateBooking` command: resolves the package, snapshots its
/// price, and stores a pending booking with a pending payment.
///
/// # Errors
///
/// Returns `PackageNotFound` if the catalog does not know the package, the
/// creation validation errors, and ledger failures. Nothing is stored on
/// error.
#[instrument(skip_all, fields(package_id = %command.package_id, seats = command.seats_requested))]
pub async fn handle_create_booking(
    command: &CreateBooking,
    clock: &dyn Clock,
    catalog: &dyn CatalogLookup,
    ledger: &dyn LedgerStore,
) -> Result<BookingCommandResult, DomainError> {
    let package = catalog
        .get_package(command.package_id)
        .await?
        .ok_or(DomainError::PackageNotFound(command.package_id))?;

    let booking_id = Uuid::new_v4();
    let mut aggregate = BookingAggregate::create(
        booking_id,
        Uuid::new_v4(),
        &command.subject,
        &package,
        command.seats_requested,
        command.travel_date,
        command.correlation_id,
        clock,
    )?;

    let stored_events = to_stored_events(&aggregate);
    ledger.insert(aggregate.record(), &stored_events).await?;
    aggregate.clear_uncommitted_events();

    info!(
        booking_id = %booking_id,
        travel_date = %command.travel_date,
        total_price = %aggregate.record().booking().total_price(),
        "booking created"
    );
    Ok(BookingCommandResult {
        aggregate_id: booking_id,
        record: aggregate.into_record(),
        stored_events,
    })
}

/// Handles the `ConfirmPayment` command: asks the gateway to authorize the
/// booking total and records the outcome.
///
/// Only one authorization per payment may be in flight; a concurrent
/// confirmation is rejected before the gateway is called. A charge that is
/// authorized after the booking was cancelled in the meantime is recorded
/// on the payment as orphaned and refunded straight away; if that refund
/// fails it is parked in `refunds`.
///
/// # Errors
///
/// Returns `Unauthorized` and `IllegalTransition` from the state machine,
/// `GatewayDeclined` when the charge was refused (the payment is then
/// `Failed` and a new attempt may be made), `GatewayUnavailable` when the
/// gateway did not answer (the payment stays `Pending` with the attempt
/// recorded), `ConcurrentModification`, and ledger failures.
#[instrument(skip_all, fields(booking_id = %command.booking_id, mode = ?command.mode))]
pub async fn handle_confirm_payment(
    command: &ConfirmPayment,
    clock: &dyn Clock,
    ledger: &dyn LedgerStore,
    gateway: &dyn PaymentGateway,
    refunds: &RefundRetryQueue,
) -> Result<BookingCommandResult, DomainError> {
    let booking_id = command.booking_id;
    let correlation_id = command.correlation_id;
    let replacement_payment_id = Uuid::new_v4();

    let request = commit_transition(ledger, booking_id, |aggregate| {
        aggregate.begin_authorization(
            &command.subject,
            command.mode,
            replacement_payment_id,
            correlation_id,
            clock,
        )
    })
    .await?
    .output;
    info!(payment_id = %request.payment_id, amount = %request.amount, "requesting authorization");

    match gateway.authorize(&request).await {
        Ok(AuthorizeOutcome::Authorized { transaction_ref }) => {
            let committed = commit_transition(ledger, booking_id, |aggregate| {
                aggregate.authorization_succeeded(
                    request.payment_id,
                    transaction_ref.clone(),
                    correlation_id,
                    clock,
                )
            })
            .await;
            match committed {
                Ok(committed) => {
                    info!(payment_id = %request.payment_id, "booking confirmed");
                    Ok(committed.into_result())
                }
                Err(err) => {
                    warn!(
                        payment_id = %request.payment_id,
                        error = %err,
                        "authorized charge could not be recorded; refunding"
                    );
                    refund_orphaned_charge(
                        &request,
                        &transaction_ref,
                        correlation_id,
                        clock,
                        ledger,
                        gateway,
                        refunds,
                    )
                    .await;
                    Err(err)
                }
            }
        }
        Ok(AuthorizeOutcome::Declined { reason }) => {
            commit_transition(ledger, booking_id, |aggregate| {
                aggregate.authorization_declined(
                    request.payment_id,
                    reason.clone(),
                    correlation_id,
                    clock,
                )
            })
            .await?;
            info!(payment_id = %request.payment_id, reason = %reason, "authorization declined");
            Err(DomainError::GatewayDeclined(reason))
        }
        Err(gateway_err) => {
            let message = gateway_err.to_string();
            let recorded = commit_transition(ledger, booking_id, |aggregate| {
                aggregate.authorization_unresolved(
                    request.payment_id,
                    message.clone(),
                    correlation_id,
                    clock,
                )
            })
            .await;
            if let Err(err) = recorded {
                warn!(payment_id = %request.payment_id, error = %err, "could not record unresolved authorization");
            }
            warn!(payment_id = %request.payment_id, error = %message, "authorization unresolved");
            Err(gateway_err)
        }
    }
}

async fn refund_orphaned_charge(
    request: &ChargeRequest,
    transaction_ref: &str,
    correlation_id: Uuid,
    clock: &dyn Clock,
    ledger: &dyn LedgerStore,
    gateway: &dyn PaymentGateway,
    refunds: &RefundRetryQueue,
) {
    let recorded = commit_transition(ledger, request.booking_id, |aggregate| {
        aggregate.record_orphaned_charge(request.payment_id, transaction_ref, correlation_id, clock)
    })
    .await;
    match recorded {
        Ok(committed) if !committed.output => {
            info!(payment_id = %request.payment_id, "charge is held by its payment; nothing to refund");
            return;
        }
        Ok(_) => {}
        Err(err) => {
            error!(payment_id = %request.payment_id, error = %err, "orphaned charge could not be recorded");
        }
    }

    let failure = match gateway.refund(transaction_ref).await {
        Ok(RefundOutcome::Refunded) => {
            let settled = commit_transition(ledger, request.booking_id, |aggregate| {
                aggregate.settle_orphaned_charge(
                    request.payment_id,
                    transaction_ref,
                    correlation_id,
                    clock,
                )
            })
            .await;
            match settled {
                Ok(_) => {
                    info!(payment_id = %request.payment_id, "orphaned charge refunded");
                    return;
                }
                Err(err) => err.to_string(),
            }
        }
        Ok(RefundOutcome::Failed { reason }) => reason,
        Err(err) => err.to_string(),
    };
    let parked = refunds
        .enqueue(
            ledger,
            FailedRefund {
                booking_id: request.booking_id,
                payment_id: request.payment_id,
                transaction_ref: transaction_ref.to_owned(),
                reason: RefundReason::OrphanedCharge,
                error: failure,
            },
            clock.now(),
        )
        .await;
    if let Err(err) = parked {
        error!(payment_id = %request.payment_id, error = %err, "orphaned charge could not be parked for refund");
    }
}

/// Handles the `CancelBooking` command.
///
/// Unpaid bookings are cancelled directly. A paid booking is first marked
/// as waiting for its refund, which keeps it from being completed, and is
/// then refunded; it only becomes `Cancelled` once the gateway acknowledges
/// the refund and the ledger records it. A refused refund leaves the
/// booking waiting and parks the refund in `refunds`, whose sweep completes
/// the cancellation later.
///
/// # Errors
///
/// Returns `BookingNotFound`, `Unauthorized`, `IllegalTransition`,
/// `RefundFailed` when the gateway did not refund, `ConcurrentModification`,
/// and ledger failures.
#[instrument(skip_all, fields(booking_id = %command.booking_id))]
pub async fn handle_cancel_booking(
    command: &CancelBooking,
    clock: &dyn Clock,
    ledger: &dyn LedgerStore,
    gateway: &dyn PaymentGateway,
    refunds: &RefundRetryQueue,
) -> Result<BookingCommandResult, DomainError> {
    let booking_id = command.booking_id;
    let correlation_id = command.correlation_id;
    let subject = command.subject;

    let requested = commit_transition(ledger, booking_id, |aggregate| {
        aggregate.request_cancellation(&subject, correlation_id, clock)
    })
    .await?;
    let (payment_id, transaction_ref) = match requested.output.clone() {
        CancelPlan::Direct => {
            info!("booking cancelled");
            return Ok(requested.into_result());
        }
        CancelPlan::RefundFirst {
            payment_id,
            transaction_ref,
        } => (payment_id, transaction_ref),
    };

    info!(payment_id = %payment_id, "refunding before cancellation");
    let failure = match gateway.refund(&transaction_ref).await {
        Ok(RefundOutcome::Refunded) => None,
        Ok(RefundOutcome::Failed { reason }) => Some(reason),
        Err(err) => Some(err.to_string()),
    };
    if let Some(reason) = failure {
        park_cancellation_refund(
            refunds,
            clock,
            ledger,
            booking_id,
            payment_id,
            transaction_ref,
            subject,
            reason.clone(),
        )
        .await?;
        return Err(DomainError::RefundFailed { booking_id, reason });
    }

    let committed = commit_transition(ledger, booking_id, |aggregate| {
        aggregate.cancel_with_refund(&subject, payment_id, correlation_id, clock)
    })
    .await;
    match committed {
        Ok(mut committed) => {
            refunds.resolve(ledger, payment_id, clock.now()).await?;
            info!(payment_id = %payment_id, "booking cancelled and refunded");
            let mut stored_events = requested.stored_events;
            stored_events.append(&mut committed.stored_events);
            committed.stored_events = stored_events;
            Ok(committed.into_result())
        }
        Err(err) => {
            if !refund_recorded(ledger, booking_id, payment_id).await {
                // The money is back but the ledger does not show it; the
                // retry sweep re-issues the idempotent refund and records it.
                park_cancellation_refund(
                    refunds,
                    clock,
                    ledger,
                    booking_id,
                    payment_id,
                    transaction_ref,
                    subject,
                    err.to_string(),
                )
                .await?;
            }
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn park_cancellation_refund(
    refunds: &RefundRetryQueue,
    clock: &dyn Clock,
    ledger: &dyn LedgerStore,
    booking_id: Uuid,
    payment_id: Uuid,
    transaction_ref: String,
    requested_by: Subject,
    error: String,
) -> Result<(), DomainError> {
    refunds
        .enqueue(
            ledger,
            FailedRefund {
                booking_id,
                payment_id,
                transaction_ref,
                reason: RefundReason::Cancellation { requested_by },
                error,
            },
            clock.now(),
        )
        .await?;
    Ok(())
}

/// Handles the `MarkCompleted` command.
///
/// # Errors
///
/// Returns `BookingNotFound`, `Unauthorized` for non-administrators,
/// `IllegalTransition` unless the booking is confirmed and paid,
/// `TravelDateNotReached`, `ConcurrentModification`, and ledger failures.
#[instrument(skip_all, fields(booking_id = %command.booking_id))]
pub async fn handle_mark_completed(
    command: &MarkCompleted,
    clock: &dyn Clock,
    ledger: &dyn LedgerStore,
) -> Result<BookingCommandResult, DomainError> {
    let committed = commit_transition(ledger, command.booking_id, |aggregate| {
        aggregate.mark_completed(&command.subject, command.correlation_id, clock)
    })
    .await?;
    info!("booking completed");
    Ok(committed.into_result())
}
