//! Test gateway — a scripted `PaymentGateway`.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use wayfare_core::error::DomainError;
use wayfare_core::gateway::{AuthorizeOutcome, ChargeRequest, PaymentGateway, RefundOutcome};

/// A gateway that replays queued outcomes and records every call.
///
/// With nothing queued, authorizations succeed with references
/// `txn_1`, `txn_2`, … and refunds succeed.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    authorize_script: Mutex<VecDeque<Result<AuthorizeOutcome, DomainError>>>,
    refund_script: Mutex<VecDeque<Result<RefundOutcome, DomainError>>>,
    authorizations: Mutex<Vec<ChargeRequest>>,
    refunds: Mutex<Vec<String>>,
    issued: AtomicU64,
}

impl ScriptedGateway {
    /// Creates a gateway that approves everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next authorization.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn push_authorize(&self, outcome: Result<AuthorizeOutcome, DomainError>) {
        self.authorize_script.lock().unwrap().push_back(outcome);
    }

    /// Queues the outcome of the next refund.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn push_refund(&self, outcome: Result<RefundOutcome, DomainError>) {
        self.refund_script.lock().unwrap().push_back(outcome);
    }

    /// Declines the next authorization.
    pub fn decline_next(&self, reason: &str) {
        self.push_authorize(Ok(AuthorizeOutcome::Declined {
            reason: reason.to_owned(),
        }));
    }

    /// Refuses the next refund.
    pub fn fail_next_refund(&self, reason: &str) {
        self.push_refund(Ok(RefundOutcome::Failed {
            reason: reason.to_owned(),
        }));
    }

    /// Snapshot of every authorization request received.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn authorizations(&self) -> Vec<ChargeRequest> {
        self.authorizations.lock().unwrap().clone()
    }

    /// Snapshot of every transaction reference a refund was requested for.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn refunds(&self) -> Vec<String> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn authorize(&self, request: &ChargeRequest) -> Result<AuthorizeOutcome, DomainError> {
        self.authorizations.lock().unwrap().push(request.clone());
        let scripted = self.authorize_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AuthorizeOutcome::Authorized {
                transaction_ref: format!("txn_{n}"),
            })
        })
    }

    async fn refund(&self, transaction_ref: &str) -> Result<RefundOutcome, DomainError> {
        self.refunds.lock().unwrap().push(transaction_ref.to_owned());
        let scripted = self.refund_script.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(RefundOutcome::Refunded))
    }
}
