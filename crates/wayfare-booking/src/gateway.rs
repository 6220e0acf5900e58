//! Gateway call bounding.
//!
//! A call that does not answer within the configured window is reported
//! as `GatewayUnavailable`, never as success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use wayfare_core::error::DomainError;
use wayfare_core::gateway::{AuthorizeOutcome, ChargeRequest, PaymentGateway, RefundOutcome};

/// Wraps a gateway so every call is bounded by `timeout`.
#[derive(Clone)]
pub struct TimeoutGateway {
    inner: Arc<dyn PaymentGateway>,
    timeout: Duration,
}

impl std::fmt::Debug for TimeoutGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutGateway")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TimeoutGateway {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn PaymentGateway>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl PaymentGateway for TimeoutGateway {
    async fn authorize(&self, request: &ChargeRequest) -> Result<AuthorizeOutcome, DomainError> {
        if let Ok(result) = tokio::time::timeout(self.timeout, self.inner.authorize(request)).await
        {
            result
        } else {
            warn!(
                booking_id = %request.booking_id,
                payment_id = %request.payment_id,
                timeout = ?self.timeout,
                "authorization timed out"
            );
            Err(DomainError::GatewayUnavailable(format!(
                "authorization timed out after {}ms",
                self.timeout.as_millis()
            )))
        }
    }

    async fn refund(&self, transaction_ref: &str) -> Result<RefundOutcome, DomainError> {
        if let Ok(result) = tokio::time::timeout(self.timeout, self.inner.refund(transaction_ref)).await
        {
            result
        } else {
            warn!(
                transaction_ref,
                timeout = ?self.timeout,
                "refund timed out"
            );
            Err(DomainError::GatewayUnavailable(format!(
                "refund timed out after {}ms",
                self.timeout.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;
    use wayfare_core::gateway::PaymentMode;

    struct StalledGateway;

    #[async_trait]
    impl PaymentGateway for StalledGateway {
        async fn authorize(
            &self,
            _request: &ChargeRequest,
        ) -> Result<AuthorizeOutcome, DomainError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AuthorizeOutcome::Authorized {
                transaction_ref: "late".into(),
            })
        }

        async fn refund(&self, _transaction_ref: &str) -> Result<RefundOutcome, DomainError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RefundOutcome::Refunded)
        }
    }

    fn charge() -> ChargeRequest {
        ChargeRequest {
            booking_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            amount: Decimal::from(10),
            mode: PaymentMode::Card,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_authorization_is_reported_unavailable() {
        let gateway = TimeoutGateway::new(Arc::new(StalledGateway), Duration::from_millis(50));

        let result = gateway.authorize(&charge()).await;

        assert!(matches!(result, Err(DomainError::GatewayUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_refund_is_reported_unavailable() {
        let gateway = TimeoutGateway::new(Arc::new(StalledGateway), Duration::from_millis(50));

        let result = gateway.refund("txn_1").await;

        assert!(matches!(result, Err(DomainError::GatewayUnavailable(_))));
    }
}
