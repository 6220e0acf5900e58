//! Refund tasks.
//!
//! A refund the gateway did not acknowledge is recorded as a task keyed by
//! payment id and stored through the ledger, so it survives restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_core::identity::Subject;

/// Why a refund was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefundReason {
    /// A cancellation is waiting on the refund; once it succeeds the booking
    /// is cancelled on behalf of `requested_by`.
    Cancellation {
        /// The subject that asked for the cancellation.
        requested_by: Subject,
    },
    /// The charge was authorized after the booking had already moved on;
    /// the money has to go back.
    OrphanedCharge,
}

/// Lifecycle of a refund task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundTaskStatus {
    /// Will be retried at `next_attempt_at`.
    Waiting,
    /// Attempt budget exhausted; needs an operator.
    Escalated,
    /// The gateway acknowledged the refund and the ledger recorded it.
    Resolved,
}

impl RefundTaskStatus {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
        }
    }
}

/// One payment awaiting refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTask {
    /// The booking the payment belongs to.
    pub booking_id: Uuid,
    /// The payment to refund.
    pub payment_id: Uuid,
    /// Gateway reference of the charge.
    pub transaction_ref: String,
    /// Why the refund is needed.
    pub reason: RefundReason,
    /// Current status.
    pub status: RefundTaskStatus,
    /// Failed attempts so far.
    pub attempts: u32,
    /// The most recent failure.
    pub last_error: String,
    /// When the task was first parked.
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time of the next automatic attempt.
    pub next_attempt_at: DateTime<Utc>,
    /// When the refund was acknowledged and recorded.
    pub resolved_at: Option<DateTime<Utc>>,
}
