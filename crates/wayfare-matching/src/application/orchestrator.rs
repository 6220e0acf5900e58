//! The match orchestrator.
//!
//! Holds one async lock per departure. A request for a departure waits for
//! any computation already running for it and then computes afresh; requests
//! for different departures never wait on each other. Locks are created on
//! demand and dropped once nobody holds or awaits them.
//!
//! The most recent outcome per departure is kept with a generation number
//! for inspection. It is never served in place of a fresh computation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use wayfare_booking::ledger::{DepartureKey, LedgerStore};
use wayfare_core::catalog::CatalogLookup;
use wayfare_core::clock::Clock;
use wayfare_core::error::DomainError;

use super::engine::find_match;
use crate::domain::selection::MatchOutcome;

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// A computed outcome tagged with when and in which order it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedMatch {
    /// Monotonically increasing across all departures.
    pub generation: u64,
    /// When the computation finished.
    pub computed_at: DateTime<Utc>,
    /// The outcome.
    pub outcome: MatchOutcome,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Departures with pending demand.
    pub departures: usize,
    /// Departures for which a group was formed.
    pub matched: usize,
    /// Departures whose computation failed.
    pub failed: usize,
}

/// Serializes matching per departure.
pub struct MatchOrchestrator {
    catalog: Arc<dyn CatalogLookup>,
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<DepartureKey, KeyLock>>,
    latest: Mutex<HashMap<DepartureKey, GeneratedMatch>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for MatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchOrchestrator")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn poisoned<T>(_: T) -> DomainError {
    DomainError::Infrastructure("match orchestrator lock poisoned".into())
}

impl MatchOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            clock,
            locks: Mutex::new(HashMap::new()),
            latest: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Computes a fresh departure group for `(package_id, travel_date)`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PackageNotFound` if the catalog does not know
    /// the package, and catalog or ledger failures.
    #[instrument(skip(self), fields(package_id = %package_id, travel_date = %travel_date))]
    pub async fn request_match(
        &self,
        package_id: Uuid,
        travel_date: NaiveDate,
        capacity_override: Option<u32>,
    ) -> Result<MatchOutcome, DomainError> {
        let key = DepartureKey {
            package_id,
            travel_date,
        };
        let lock = self.acquire_key(key)?;
        let computed = {
            let _guard = lock.lock().await;
            let computed = find_match(
                key,
                capacity_override,
                self.catalog.as_ref(),
                self.ledger.as_ref(),
            )
            .await;
            if let Ok(outcome) = &computed {
                self.remember(key, outcome.clone())?;
            }
            computed
        };
        self.release_key(key, lock)?;
        computed
    }

    /// The most recent outcome computed for a departure.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the cache lock is poisoned.
    pub fn latest(
        &self,
        package_id: Uuid,
        travel_date: NaiveDate,
    ) -> Result<Option<GeneratedMatch>, DomainError> {
        let latest = self.latest.lock().map_err(poisoned)?;
        Ok(latest
            .get(&DepartureKey {
                package_id,
                travel_date,
            })
            .cloned())
    }

    /// Runs one matching pass over every departure with pending demand.
    /// A failing departure is logged and does not stop the pass.
    ///
    /// # Errors
    ///
    /// Returns ledger failures while listing departures.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, DomainError> {
        let departures = self.ledger.pending_departures().await?;
        let mut report = SweepReport {
            departures: departures.len(),
            ..SweepReport::default()
        };
        for key in departures {
            match self.request_match(key.package_id, key.travel_date, None).await {
                Ok(MatchOutcome::Matched(_)) => report.matched += 1,
                Ok(MatchOutcome::NoMatch) => {}
                Err(err) => {
                    warn!(
                        package_id = %key.package_id,
                        travel_date = %key.travel_date,
                        error = %err,
                        "matching pass failed for departure"
                    );
                    report.failed += 1;
                }
            }
        }
        info!(
            departures = report.departures,
            matched = report.matched,
            failed = report.failed,
            "matching sweep finished"
        );
        Ok(report)
    }

    fn acquire_key(&self, key: DepartureKey) -> Result<KeyLock, DomainError> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        Ok(Arc::clone(locks.entry(key).or_default()))
    }

    fn release_key(&self, key: DepartureKey, lock: KeyLock) -> Result<(), DomainError> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        // Only the map and this caller hold it: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
        Ok(())
    }

    fn remember(&self, key: DepartureKey, outcome: MatchOutcome) -> Result<(), DomainError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut latest = self.latest.lock().map_err(poisoned)?;
        latest.insert(
            key,
            GeneratedMatch {
                generation,
                computed_at: self.clock.now(),
                outcome,
            },
        );
        Ok(())
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}
