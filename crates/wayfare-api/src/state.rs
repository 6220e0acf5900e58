//! Shared application state.

use std::sync::Arc;

use wayfare_booking::application::refund_queue::RefundRetryQueue;
use wayfare_booking::ledger::LedgerStore;
use wayfare_core::catalog::CatalogLookup;
use wayfare_core::clock::Clock;
use wayfare_core::gateway::PaymentGateway;
use wayfare_matching::application::orchestrator::MatchOrchestrator;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock for timestamps and travel-date checks.
    pub clock: Arc<dyn Clock>,
    /// Package metadata.
    pub catalog: Arc<dyn CatalogLookup>,
    /// Booking records and their history.
    pub ledger: Arc<dyn LedgerStore>,
    /// Payment processor, already bounded by a timeout.
    pub gateway: Arc<dyn PaymentGateway>,
    /// Refunds waiting to be retried.
    pub refunds: Arc<RefundRetryQueue>,
    /// Per-departure matching.
    pub matcher: Arc<MatchOrchestrator>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("refunds", &self.refunds)
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state. The match orchestrator is built over
    /// the same catalog, ledger and clock.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        catalog: Arc<dyn CatalogLookup>,
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        refunds: RefundRetryQueue,
    ) -> Self {
        let matcher = Arc::new(MatchOrchestrator::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&clock),
        ));
        Self {
            clock,
            catalog,
            ledger,
            gateway,
            refunds: Arc::new(refunds),
            matcher,
        }
    }
}
