//! Polling loop: fetch, compare, reconcile, sleep

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dedup::has_changed;
use crate::models::Snapshot;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::source::RecordSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting for the next tick
    Idle,
    /// A fetch/compare/reconcile pass is in progress
    Syncing,
}

/// How a single cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The source could not be read; nothing else was attempted
    FetchFailed(String),
    /// Snapshot identical to the last processed one
    Unchanged,
    /// Snapshot changed and was reconciled
    Reconciled(ReconcileReport),
}

pub struct SyncLoop {
    source: Arc<dyn RecordSource>,
    reconciler: Reconciler,
    interval: Duration,
    state: SyncState,
    last_snapshot: Option<Snapshot>,
}

impl SyncLoop {
    pub fn new(source: Arc<dyn RecordSource>, reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            source,
            reconciler,
            interval,
            state: SyncState::Idle,
            last_snapshot: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }

    /// Run one Syncing pass and return to Idle whatever happens
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state = SyncState::Syncing;
        let outcome = self.sync_once().await;
        self.state = SyncState::Idle;
        outcome
    }

    async fn sync_once(&mut self) -> CycleOutcome {
        let fetched = match self.source.fetch().await {
            Ok(rows) => rows,
            Err(e) => {
                log::error!("Failed to fetch data, retrying next cycle: {:#}", e);
                return CycleOutcome::FetchFailed(format!("{:#}", e));
            }
        };

        let snapshot = Snapshot::from_fetched(fetched);

        if !has_changed(self.last_snapshot.as_ref(), &snapshot) {
            log::info!("No updates detected");
            return CycleOutcome::Unchanged;
        }

        log::info!(
            "Data updated ({} rows), transferring to database",
            snapshot.len()
        );
        let report = self.reconciler.reconcile(&snapshot).await;
        self.last_snapshot = Some(snapshot);
        CycleOutcome::Reconciled(report)
    }

    /// Run cycles forever. The delay is applied after each cycle finishes,
    /// so the effective period is the interval plus the cycle's duration.
    pub async fn run(&mut self) {
        log::info!("Starting sync loop (interval {:?})", self.interval);
        loop {
            let started = Instant::now();
            let outcome = self.run_cycle().await;
            log::debug!(
                "Cycle finished in {:?} ({:?}, remembering {} rows): {:?}",
                started.elapsed(),
                self.state(),
                self.last_snapshot().map_or(0, Snapshot::len),
                outcome
            );
            tokio::time::sleep(self.interval).await;
        }
    }
}
