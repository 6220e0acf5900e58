//! Payment gateway port.

use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Which payment path was used. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Card charge through the processor.
    #[default]
    Card,
    /// Simplified automatic charge.
    Auto,
    /// Development gateway.
    Mock,
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card => f.write_str("card"),
            Self::Auto => f.write_str("auto"),
            Self::Mock => f.write_str("mock"),
        }
    }
}

/// A charge to authorize, with the metadata the processor records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// The booking being paid for.
    pub booking_id: Uuid,
    /// The payment record the charge belongs to.
    pub payment_id: Uuid,
    /// Amount to charge.
    pub amount: Decimal,
    /// Payment path.
    pub mode: PaymentMode,
}

/// Result of an authorization the gateway answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// The charge was authorized.
    Authorized {
        /// Processor reference, used for refunds.
        transaction_ref: String,
    },
    /// The charge was refused.
    Declined {
        /// Processor-supplied reason.
        reason: String,
    },
}

/// Result of a refund the gateway answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    /// The charge was refunded.
    Refunded,
    /// The refund was refused.
    Failed {
        /// Processor-supplied reason.
        reason: String,
    },
}

/// External payment processor.
///
/// `Err` means the gateway could not be reached or did not answer; the
/// caller must not assume the charge or refund did not happen.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorizes a charge.
    async fn authorize(&self, request: &ChargeRequest) -> Result<AuthorizeOutcome, DomainError>;

    /// Refunds a previously authorized charge. Idempotent per `transaction_ref`.
    async fn refund(&self, transaction_ref: &str) -> Result<RefundOutcome, DomainError>;
}
