//! Simulated payment gateway for deployments without a processor.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;
use wayfare_core::error::DomainError;
use wayfare_core::gateway::{AuthorizeOutcome, ChargeRequest, PaymentGateway, RefundOutcome};

/// Authorizes every positive amount with an `auto_` reference and
/// acknowledges every refund.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedGateway;

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn authorize(&self, request: &ChargeRequest) -> Result<AuthorizeOutcome, DomainError> {
        if request.amount <= Decimal::ZERO {
            warn!(payment_id = %request.payment_id, amount = %request.amount, "simulated charge declined");
            return Ok(AuthorizeOutcome::Declined {
                reason: "amount must be positive".into(),
            });
        }
        let transaction_ref = format!("auto_{}", Uuid::new_v4().simple());
        info!(
            booking_id = %request.booking_id,
            payment_id = %request.payment_id,
            amount = %request.amount,
            mode = %request.mode,
            transaction_ref = %transaction_ref,
            "simulated charge authorized"
        );
        Ok(AuthorizeOutcome::Authorized { transaction_ref })
    }

    async fn refund(&self, transaction_ref: &str) -> Result<RefundOutcome, DomainError> {
        info!(transaction_ref = %transaction_ref, "simulated refund issued");
        Ok(RefundOutcome::Refunded)
    }
}
