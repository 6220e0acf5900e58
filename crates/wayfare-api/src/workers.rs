//! Background workers: the refund retry sweep and the periodic matching
//! sweep.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error};
use wayfare_booking::application::refund_queue::process_due_refunds;

use crate::state::AppState;

/// Retries due refunds every `every`.
#[must_use]
pub fn spawn_refund_worker(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match process_due_refunds(
                &state.refunds,
                state.clock.as_ref(),
                state.ledger.as_ref(),
                state.gateway.as_ref(),
            )
            .await
            {
                Ok(report) => debug!(attempted = report.attempted, "refund sweep tick"),
                Err(err) => error!(error = %err, "refund sweep failed"),
            }
        }
    })
}

/// Runs a matching pass over every departure with pending demand every
/// `every`.
#[must_use]
pub fn spawn_match_sweeper(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = state.matcher.sweep().await {
                error!(error = %err, "matching sweep failed");
            }
        }
    })
}
