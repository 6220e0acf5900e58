//! Refund retry queue.
//!
//! A refund the gateway did not acknowledge blocks the cancellation that
//! needed it. Such refunds are parked as tasks, one per payment, stored
//! through the [`LedgerStore`] so they survive a restart. A periodic sweep
//! retries them with exponential backoff until the gateway acknowledges or
//! the attempt budget runs out. Exhausted tasks are escalated and stay
//! visible to operators, who may force another attempt.
//!
//! Refunds are requested by transaction reference, which the gateway treats
//! idempotently, so retrying after an unknown outcome is safe. A task is
//! only resolved once the ledger holds the refund.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use wayfare_core::clock::Clock;
use wayfare_core::error::DomainError;
use wayfare_core::gateway::{PaymentGateway, RefundOutcome};
use wayfare_core::lifecycle::PaymentStatus;

use super::command_handlers::commit_transition;
pub use crate::domain::refunds::{RefundReason, RefundTask, RefundTaskStatus};
use crate::ledger::LedgerStore;

/// Backoff settings for refund retries.
///
/// The delay after the `n`-th failed attempt is `initial_delay × 2^(n-1)`,
/// capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RefundRetryPolicy {
    /// Failed attempts after which a task is escalated.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RefundRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RefundRetryPolicy {
    /// Delay to wait after `failed_attempts` failures.
    #[must_use]
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(20);
        self.initial_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

/// Details of a failed refund, used to park it.
#[derive(Debug, Clone)]
pub struct FailedRefund {
    /// The booking.
    pub booking_id: Uuid,
    /// The payment.
    pub payment_id: Uuid,
    /// Gateway reference of the charge.
    pub transaction_ref: String,
    /// Why the refund is needed.
    pub reason: RefundReason,
    /// What went wrong.
    pub error: String,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefundSweepReport {
    /// Tasks that were due and retried.
    pub attempted: usize,
    /// Tasks the gateway acknowledged.
    pub resolved: usize,
    /// Tasks that failed again and are still waiting.
    pub rescheduled: usize,
    /// Tasks that ran out of attempts during this sweep.
    pub escalated: usize,
}

/// Scheduling rules for refund tasks kept in a [`LedgerStore`].
///
/// The queue holds no tasks itself; two queues over the same ledger see
/// the same tasks. Updates made through one queue are serialized.
#[derive(Debug, Default)]
pub struct RefundRetryQueue {
    policy: RefundRetryPolicy,
    writes: Mutex<()>,
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn no_open_task(payment_id: Uuid) -> DomainError {
    DomainError::Validation(format!("no open refund task for payment {payment_id}"))
}

impl RefundRetryQueue {
    /// Creates a queue with the given policy.
    #[must_use]
    pub fn new(policy: RefundRetryPolicy) -> Self {
        Self {
            policy,
            writes: Mutex::new(()),
        }
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RefundRetryPolicy {
        &self.policy
    }

    /// Parks a failed refund. A payment that already has an open task has
    /// the failure counted against that task instead.
    ///
    /// # Errors
    ///
    /// Returns ledger failures.
    pub async fn enqueue(
        &self,
        ledger: &dyn LedgerStore,
        failed: FailedRefund,
        now: DateTime<Utc>,
    ) -> Result<RefundTask, DomainError> {
        let _writing = self.writes.lock().await;
        if let Some(open) = ledger
            .load_refund_task(failed.payment_id)
            .await?
            .filter(|t| t.status != RefundTaskStatus::Resolved)
        {
            return self.count_failure(ledger, open, failed.error, now).await;
        }
        let task = RefundTask {
            booking_id: failed.booking_id,
            payment_id: failed.payment_id,
            transaction_ref: failed.transaction_ref,
            reason: failed.reason,
            status: RefundTaskStatus::Waiting,
            attempts: 1,
            last_error: failed.error,
            enqueued_at: now,
            next_attempt_at: after(now, self.policy.delay_after(1)),
            resolved_at: None,
        };
        ledger.save_refund_task(&task).await?;
        warn!(
            booking_id = %task.booking_id,
            payment_id = %task.payment_id,
            error = %task.last_error,
            "refund parked for retry"
        );
        Ok(task)
    }

    /// Every task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns ledger failures.
    pub async fn tasks(&self, ledger: &dyn LedgerStore) -> Result<Vec<RefundTask>, DomainError> {
        ledger.list_refund_tasks().await
    }

    /// The task for one payment.
    ///
    /// # Errors
    ///
    /// Returns ledger failures.
    pub async fn get(
        &self,
        ledger: &dyn LedgerStore,
        payment_id: Uuid,
    ) -> Result<Option<RefundTask>, DomainError> {
        ledger.load_refund_task(payment_id).await
    }

    /// Waiting tasks whose next attempt is due at `now`.
    ///
    /// # Errors
    ///
    /// Returns ledger failures.
    pub async fn due(
        &self,
        ledger: &dyn LedgerStore,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefundTask>, DomainError> {
        Ok(ledger
            .list_refund_tasks()
            .await?
            .into_iter()
            .filter(|t| t.status == RefundTaskStatus::Waiting && t.next_attempt_at <= now)
            .collect())
    }

    /// Counts one more failed attempt, rescheduling or escalating the task.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if no task exists for the payment,
    /// and ledger failures.
    pub async fn record_failure(
        &self,
        ledger: &dyn LedgerStore,
        payment_id: Uuid,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<RefundTask, DomainError> {
        let _writing = self.writes.lock().await;
        let task = ledger.load_refund_task(payment_id).await?.ok_or_else(|| {
            DomainError::Validation(format!("no refund task for payment {payment_id}"))
        })?;
        self.count_failure(ledger, task, error, now).await
    }

    async fn count_failure(
        &self,
        ledger: &dyn LedgerStore,
        mut task: RefundTask,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<RefundTask, DomainError> {
        task.attempts += 1;
        task.last_error = error;
        if task.attempts >= self.policy.max_attempts {
            task.status = RefundTaskStatus::Escalated;
            error!(
                booking_id = %task.booking_id,
                payment_id = %task.payment_id,
                attempts = task.attempts,
                error = %task.last_error,
                "refund escalated for manual handling"
            );
        } else {
            task.status = RefundTaskStatus::Waiting;
            task.next_attempt_at = after(now, self.policy.delay_after(task.attempts));
        }
        ledger.save_refund_task(&task).await?;
        Ok(task)
    }

    /// Marks the task for `payment_id` resolved. Returns `false` if there
    /// was no open task.
    ///
    /// # Errors
    ///
    /// Returns ledger failures.
    pub async fn resolve(
        &self,
        ledger: &dyn LedgerStore,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let _writing = self.writes.lock().await;
        match ledger.load_refund_task(payment_id).await? {
            Some(mut task) if task.status != RefundTaskStatus::Resolved => {
                task.status = RefundTaskStatus::Resolved;
                task.resolved_at = Some(now);
                ledger.save_refund_task(&task).await?;
                info!(booking_id = %task.booking_id, payment_id = %payment_id, "refund resolved");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Makes an open task due immediately. An escalated task gets one
    /// more attempt before it escalates again.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if there is no open task for the
    /// payment, and ledger failures.
    pub async fn force_retry(
        &self,
        ledger: &dyn LedgerStore,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefundTask, DomainError> {
        let _writing = self.writes.lock().await;
        let mut task = ledger
            .load_refund_task(payment_id)
            .await?
            .filter(|t| t.status != RefundTaskStatus::Resolved)
            .ok_or_else(|| no_open_task(payment_id))?;
        if task.status == RefundTaskStatus::Escalated {
            task.attempts = self.policy.max_attempts.saturating_sub(1);
        }
        task.status = RefundTaskStatus::Waiting;
        task.next_attempt_at = now;
        ledger.save_refund_task(&task).await?;
        info!(payment_id = %payment_id, "refund retry forced");
        Ok(task)
    }
}

/// Retries every due refund once.
///
/// An acknowledged cancellation refund drives the booking to
/// `(Cancelled, Refunded)`, and an acknowledged orphan refund is marked on
/// its payment. If that commit cannot be made the task stays open so the
/// next sweep finishes it.
///
/// # Errors
///
/// Returns ledger failures while reading or updating tasks. Gateway
/// failures and failed commits are recorded on the task, not returned.
#[instrument(skip_all)]
pub async fn process_due_refunds(
    queue: &RefundRetryQueue,
    clock: &dyn Clock,
    ledger: &dyn LedgerStore,
    gateway: &dyn PaymentGateway,
) -> Result<RefundSweepReport, DomainError> {
    let mut report = RefundSweepReport::default();
    for task in queue.due(ledger, clock.now()).await? {
        report.attempted += 1;
        let failure = match gateway.refund(&task.transaction_ref).await {
            Ok(RefundOutcome::Refunded) => settle(&task, clock, ledger).await.err(),
            Ok(RefundOutcome::Failed { reason }) => Some(reason),
            Err(err) => Some(err.to_string()),
        };
        match failure {
            None => {
                queue.resolve(ledger, task.payment_id, clock.now()).await?;
                report.resolved += 1;
            }
            Some(reason) => {
                let updated = queue
                    .record_failure(ledger, task.payment_id, reason, clock.now())
                    .await?;
                if updated.status == RefundTaskStatus::Escalated {
                    report.escalated += 1;
                } else {
                    report.rescheduled += 1;
                }
            }
        }
    }
    if report.attempted > 0 {
        info!(
            attempted = report.attempted,
            resolved = report.resolved,
            rescheduled = report.rescheduled,
            escalated = report.escalated,
            "refund sweep finished"
        );
    }
    Ok(report)
}

/// Records an acknowledged refund in the ledger.
async fn settle(
    task: &RefundTask,
    clock: &dyn Clock,
    ledger: &dyn LedgerStore,
) -> Result<(), String> {
    let correlation_id = Uuid::new_v4();
    let RefundReason::Cancellation { requested_by } = task.reason else {
        commit_transition(ledger, task.booking_id, |aggregate| {
            aggregate.settle_orphaned_charge(
                task.payment_id,
                &task.transaction_ref,
                correlation_id,
                clock,
            )
        })
        .await
        .map_err(|err| err.to_string())?;
        info!(booking_id = %task.booking_id, payment_id = %task.payment_id, "orphaned charge refunded");
        return Ok(());
    };
    let committed = commit_transition(ledger, task.booking_id, |aggregate| {
        aggregate.cancel_with_refund(&requested_by, task.payment_id, correlation_id, clock)
    })
    .await;
    match committed {
        Ok(_) => {
            info!(booking_id = %task.booking_id, payment_id = %task.payment_id, "deferred cancellation committed");
            Ok(())
        }
        Err(err @ DomainError::IllegalTransition { .. }) => {
            if refund_recorded(ledger, task.booking_id, task.payment_id).await {
                Ok(())
            } else {
                warn!(booking_id = %task.booking_id, error = %err, "refund acknowledged but not recorded");
                Err(err.to_string())
            }
        }
        Err(err) => Err(err.to_string()),
    }
}

/// Whether the ledger already shows `payment_id` as refunded.
pub(crate) async fn refund_recorded(
    ledger: &dyn LedgerStore,
    booking_id: Uuid,
    payment_id: Uuid,
) -> bool {
    match ledger.load(booking_id).await {
        Ok(Some(entry)) => entry
            .record
            .payments()
            .iter()
            .any(|p| p.id() == payment_id && p.status() == PaymentStatus::Refunded),
        Ok(None) => false,
        Err(err) => {
            warn!(booking_id = %booking_id, error = %err, "could not read booking");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use wayfare_core::gateway::PaymentMode;
    use wayfare_core::identity::Subject;
    use wayfare_core::lifecycle::BookingStatus;
    use wayfare_test_support::{FixedClock, InMemoryCatalog, ScriptedGateway};

    use super::*;
    use crate::application::command_handlers::{
        handle_cancel_booking, handle_confirm_payment, handle_create_booking,
        handle_mark_completed,
    };
    use crate::domain::commands::{CancelBooking, ConfirmPayment, CreateBooking, MarkCompleted};
    use crate::ledger::InMemoryLedgerStore;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    fn failed(payment_id: Uuid) -> FailedRefund {
        FailedRefund {
            booking_id: Uuid::new_v4(),
            payment_id,
            transaction_ref: "txn_1".into(),
            reason: RefundReason::OrphanedCharge,
            error: "gateway timeout".into(),
        }
    }

    fn policy(max_attempts: u32) -> RefundRetryPolicy {
        RefundRetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy(8);

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(4), Duration::from_millis(800));
        assert_eq!(policy.delay_after(5), Duration::from_secs(1));
        assert_eq!(policy.delay_after(40), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_enqueue_schedules_first_retry() {
        // Arrange
        let ledger = InMemoryLedgerStore::new();
        let queue = RefundRetryQueue::new(policy(8));
        let now = clock().0;
        let payment_id = Uuid::new_v4();

        // Act
        let task = queue.enqueue(&ledger, failed(payment_id), now).await.unwrap();

        // Assert
        assert_eq!(task.status, RefundTaskStatus::Waiting);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.next_attempt_at, now + TimeDelta::milliseconds(100));
        assert!(queue.due(&ledger, now).await.unwrap().is_empty());
        assert_eq!(
            queue
                .due(&ledger, now + TimeDelta::milliseconds(100))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_enqueue_twice_counts_against_open_task() {
        let ledger = InMemoryLedgerStore::new();
        let queue = RefundRetryQueue::new(policy(8));
        let now = clock().0;
        let payment_id = Uuid::new_v4();

        queue.enqueue(&ledger, failed(payment_id), now).await.unwrap();
        let task = queue.enqueue(&ledger, failed(payment_id), now).await.unwrap();

        assert_eq!(task.attempts, 2);
        assert_eq!(queue.tasks(&ledger).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tasks_survive_a_new_queue_over_the_same_ledger() {
        // Arrange
        let ledger = InMemoryLedgerStore::new();
        let now = clock().0;
        let payment_id = Uuid::new_v4();
        RefundRetryQueue::new(policy(8))
            .enqueue(&ledger, failed(payment_id), now)
            .await
            .unwrap();

        // Act
        let restarted = RefundRetryQueue::new(policy(8));
        let due = restarted
            .due(&ledger, now + TimeDelta::seconds(1))
            .await
            .unwrap();

        // Assert
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].payment_id, payment_id);
        assert_eq!(due[0].last_error, "gateway timeout");
    }

    #[tokio::test]
    async fn test_task_escalates_when_attempts_run_out() {
        // Arrange
        let ledger = InMemoryLedgerStore::new();
        let queue = RefundRetryQueue::new(policy(3));
        let now = clock().0;
        let payment_id = Uuid::new_v4();
        queue.enqueue(&ledger, failed(payment_id), now).await.unwrap();

        // Act
        queue
            .record_failure(&ledger, payment_id, "again".into(), now)
            .await
            .unwrap();
        let task = queue
            .record_failure(&ledger, payment_id, "still".into(), now)
            .await
            .unwrap();

        // Assert
        assert_eq!(task.status, RefundTaskStatus::Escalated);
        assert_eq!(task.last_error, "still");
        assert!(queue
            .due(&ledger, now + TimeDelta::days(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_force_retry_reopens_escalated_task_for_one_attempt() {
        // Arrange
        let ledger = InMemoryLedgerStore::new();
        let queue = RefundRetryQueue::new(policy(2));
        let now = clock().0;
        let payment_id = Uuid::new_v4();
        queue.enqueue(&ledger, failed(payment_id), now).await.unwrap();
        queue
            .record_failure(&ledger, payment_id, "down".into(), now)
            .await
            .unwrap();

        // Act
        let task = queue.force_retry(&ledger, payment_id, now).await.unwrap();
        let again = queue
            .record_failure(&ledger, payment_id, "down".into(), now)
            .await
            .unwrap();

        // Assert
        assert_eq!(task.status, RefundTaskStatus::Waiting);
        assert_eq!(task.next_attempt_at, now);
        assert_eq!(again.status, RefundTaskStatus::Escalated);
    }

    #[tokio::test]
    async fn test_force_retry_of_unknown_payment_fails() {
        let ledger = InMemoryLedgerStore::new();
        let queue = RefundRetryQueue::default();

        let result = queue.force_retry(&ledger, Uuid::new_v4(), clock().0).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_resolve_is_reported_once() {
        let ledger = InMemoryLedgerStore::new();
        let queue = RefundRetryQueue::default();
        let now = clock().0;
        let payment_id = Uuid::new_v4();
        queue.enqueue(&ledger, failed(payment_id), now).await.unwrap();

        assert!(queue.resolve(&ledger, payment_id, now).await.unwrap());
        assert!(!queue.resolve(&ledger, payment_id, now).await.unwrap());
        assert_eq!(
            queue
                .get(&ledger, payment_id)
                .await
                .unwrap()
                .unwrap()
                .status,
            RefundTaskStatus::Resolved
        );
    }

    async fn confirmed_booking(
        clock: &FixedClock,
        ledger: &InMemoryLedgerStore,
        gateway: &ScriptedGateway,
        queue: &RefundRetryQueue,
        owner: Subject,
        travel_date: NaiveDate,
    ) -> Uuid {
        let catalog = InMemoryCatalog::new();
        let package_id = catalog.add_package(Decimal::from(100), 10);
        let created = handle_create_booking(
            &CreateBooking {
                correlation_id: Uuid::new_v4(),
                subject: owner,
                package_id,
                seats_requested: 2,
                travel_date,
            },
            clock,
            &catalog,
            ledger,
        )
        .await
        .unwrap();
        handle_confirm_payment(
            &ConfirmPayment {
                correlation_id: Uuid::new_v4(),
                subject: owner,
                booking_id: created.aggregate_id,
                mode: PaymentMode::Card,
            },
            clock,
            ledger,
            gateway,
            queue,
        )
        .await
        .unwrap();
        created.aggregate_id
    }

    fn march_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    async fn cancel(
        clock: &FixedClock,
        ledger: &InMemoryLedgerStore,
        gateway: &ScriptedGateway,
        queue: &RefundRetryQueue,
        subject: Subject,
        booking_id: Uuid,
    ) -> Result<crate::application::command_handlers::BookingCommandResult, DomainError> {
        handle_cancel_booking(
            &CancelBooking {
                correlation_id: Uuid::new_v4(),
                subject,
                booking_id,
            },
            clock,
            ledger,
            gateway,
            queue,
        )
        .await
    }

    #[tokio::test]
    async fn test_sweep_completes_blocked_cancellation() {
        // Arrange
        let clock = clock();
        let ledger = InMemoryLedgerStore::new();
        let gateway = ScriptedGateway::new();
        let queue = RefundRetryQueue::new(policy(8));
        let owner = Subject::user(Uuid::new_v4());
        let booking_id =
            confirmed_booking(&clock, &ledger, &gateway, &queue, owner, march_first()).await;
        gateway.fail_next_refund("processor offline");
        let blocked = cancel(&clock, &ledger, &gateway, &queue, owner, booking_id).await;
        assert!(matches!(blocked, Err(DomainError::RefundFailed { .. })));
        let later = FixedClock(clock.0 + TimeDelta::seconds(1));

        // Act
        let report = process_due_refunds(&queue, &later, &ledger, &gateway)
            .await
            .unwrap();

        // Assert
        assert_eq!(report.attempted, 1);
        assert_eq!(report.resolved, 1);
        let record = ledger.load(booking_id).await.unwrap().unwrap().record;
        assert_eq!(record.booking().status(), BookingStatus::Cancelled);
        assert!(record.booking().cancellation_requested_by().is_none());
        assert_eq!(
            record.active_payment().unwrap().status(),
            PaymentStatus::Refunded
        );
        assert_eq!(gateway.refunds(), vec!["txn_1".to_owned(), "txn_1".to_owned()]);
    }

    #[tokio::test]
    async fn test_completion_waits_for_a_blocked_cancellation_refund() {
        // Arrange
        let clock = clock();
        let ledger = InMemoryLedgerStore::new();
        let gateway = ScriptedGateway::new();
        let queue = RefundRetryQueue::new(policy(8));
        let owner = Subject::user(Uuid::new_v4());
        let admin = Subject::admin(Uuid::new_v4());
        let booking_id =
            confirmed_booking(&clock, &ledger, &gateway, &queue, owner, clock.today()).await;
        gateway.fail_next_refund("processor offline");
        let blocked = cancel(&clock, &ledger, &gateway, &queue, owner, booking_id).await;
        assert!(matches!(blocked, Err(DomainError::RefundFailed { .. })));

        // Act
        let completed = handle_mark_completed(
            &MarkCompleted {
                correlation_id: Uuid::new_v4(),
                subject: admin,
                booking_id,
            },
            &clock,
            &ledger,
        )
        .await;
        let later = FixedClock(clock.0 + TimeDelta::seconds(1));
        let report = process_due_refunds(&queue, &later, &ledger, &gateway)
            .await
            .unwrap();

        // Assert
        assert!(matches!(
            completed,
            Err(DomainError::IllegalTransition { .. })
        ));
        assert_eq!(report.resolved, 1);
        let record = ledger.load(booking_id).await.unwrap().unwrap().record;
        assert_eq!(record.booking().status(), BookingStatus::Cancelled);
        assert_eq!(
            record.active_payment().unwrap().status(),
            PaymentStatus::Refunded
        );
    }

    #[tokio::test]
    async fn test_acknowledged_refund_against_a_completed_booking_stays_open() {
        // Arrange
        let clock = clock();
        let ledger = InMemoryLedgerStore::new();
        let gateway = ScriptedGateway::new();
        let queue = RefundRetryQueue::new(policy(8));
        let owner = Subject::user(Uuid::new_v4());
        let booking_id =
            confirmed_booking(&clock, &ledger, &gateway, &queue, owner, clock.today()).await;
        handle_mark_completed(
            &MarkCompleted {
                correlation_id: Uuid::new_v4(),
                subject: Subject::admin(Uuid::new_v4()),
                booking_id,
            },
            &clock,
            &ledger,
        )
        .await
        .unwrap();
        let payment_id = ledger
            .load(booking_id)
            .await
            .unwrap()
            .unwrap()
            .record
            .active_payment()
            .unwrap()
            .id();
        queue
            .enqueue(
                &ledger,
                FailedRefund {
                    booking_id,
                    payment_id,
                    transaction_ref: "txn_1".into(),
                    reason: RefundReason::Cancellation {
                        requested_by: owner,
                    },
                    error: "processor offline".into(),
                },
                clock.0,
            )
            .await
            .unwrap();
        let later = FixedClock(clock.0 + TimeDelta::seconds(1));

        // Act
        let report = process_due_refunds(&queue, &later, &ledger, &gateway)
            .await
            .unwrap();

        // Assert
        assert_eq!(report.resolved, 0);
        assert_eq!(report.rescheduled, 1);
        let task = queue.get(&ledger, payment_id).await.unwrap().unwrap();
        assert_eq!(task.status, RefundTaskStatus::Waiting);
        assert_eq!(task.attempts, 2);
        assert!(task.last_error.contains("cannot cancel"));
    }

    #[tokio::test]
    async fn test_acknowledged_refund_recorded_elsewhere_resolves() {
        // Arrange
        let clock = clock();
        let ledger = InMemoryLedgerStore::new();
        let gateway = ScriptedGateway::new();
        let queue = RefundRetryQueue::new(policy(8));
        let owner = Subject::user(Uuid::new_v4());
        let booking_id =
            confirmed_booking(&clock, &ledger, &gateway, &queue, owner, march_first()).await;
        gateway.fail_next_refund("processor offline");
        let _ = cancel(&clock, &ledger, &gateway, &queue, owner, booking_id).await;
        cancel(&clock, &ledger, &gateway, &queue, owner, booking_id)
            .await
            .unwrap();
        let payment_id = ledger
            .load(booking_id)
            .await
            .unwrap()
            .unwrap()
            .record
            .active_payment()
            .unwrap()
            .id();
        // The second cancellation resolved the task; reopen it as if a
        // sweep had picked it up before that.
        let mut task = queue.get(&ledger, payment_id).await.unwrap().unwrap();
        task.status = RefundTaskStatus::Waiting;
        task.resolved_at = None;
        ledger.save_refund_task(&task).await.unwrap();

        // Act
        let report = process_due_refunds(
            &queue,
            &FixedClock(clock.0 + TimeDelta::seconds(1)),
            &ledger,
            &gateway,
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(report.resolved, 1);
    }

    #[tokio::test]
    async fn test_sweep_reschedules_and_then_escalates() {
        // Arrange
        let clock = clock();
        let ledger = InMemoryLedgerStore::new();
        let gateway = Arc::new(ScriptedGateway::new());
        let queue = RefundRetryQueue::new(policy(2));
        let owner = Subject::user(Uuid::new_v4());
        let booking_id =
            confirmed_booking(&clock, &ledger, &gateway, &queue, owner, march_first()).await;
        gateway.fail_next_refund("processor offline");
        gateway.fail_next_refund("processor offline");
        let _ = cancel(&clock, &ledger, gateway.as_ref(), &queue, owner, booking_id).await;
        let later = FixedClock(clock.0 + TimeDelta::seconds(5));

        // Act
        let report = process_due_refunds(&queue, &later, &ledger, gateway.as_ref())
            .await
            .unwrap();

        // Assert
        assert_eq!(report.escalated, 1);
        let record = ledger.load(booking_id).await.unwrap().unwrap().record;
        assert_eq!(record.booking().status(), BookingStatus::Confirmed);
        assert!(record.booking().cancellation_requested_by().is_some());
        assert_eq!(
            record.active_payment().unwrap().status(),
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_due_does_nothing() {
        let clock = clock();
        let ledger = InMemoryLedgerStore::new();
        let gateway = ScriptedGateway::new();
        let queue = RefundRetryQueue::default();

        let report = process_due_refunds(&queue, &clock, &ledger, &gateway)
            .await
            .unwrap();

        assert_eq!(report, RefundSweepReport::default());
        assert!(gateway.refunds().is_empty());
    }
}
