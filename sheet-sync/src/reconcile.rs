//! Reconciliation of a snapshot against the persisted table
//!
//! Loads the persisted records, drops every snapshot record already present
//! and hands the rest to the store in one batch. The in-memory check only
//! avoids pointless inserts; the table's uniqueness constraint remains the
//! authority on duplicates.

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{Record, Snapshot};
use crate::store::{ExistingSet, PersistenceStore};

/// What one reconciliation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Data rows considered (header excluded)
    pub candidates: usize,
    /// Records skipped because they were already persisted or repeated in the snapshot
    pub already_present: usize,
    /// Rows written
    pub inserted: usize,
    /// Inserts the store ignored as conflicts
    pub duplicates: usize,
    /// Rows that could not be converted or inserted: (offending value, reason)
    pub failed: Vec<(String, String)>,
    /// Set when the insert batch as a whole did not complete
    pub store_error: Option<String>,
}

pub struct Reconciler {
    store: Arc<dyn PersistenceStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, snapshot: &Snapshot) -> ReconcileReport {
        let mut report = ReconcileReport {
            candidates: snapshot.len(),
            ..Default::default()
        };

        let mut records = Vec::with_capacity(snapshot.len());
        for (idx, row) in snapshot.rows().iter().enumerate() {
            match Record::try_from(row.as_slice()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // +2: 1-based, and the header occupies the first sheet row
                    let value = serde_json::Value::Array(row.clone()).to_string();
                    log::error!("Skipping sheet row {} {}: {}", idx + 2, value, e);
                    report.failed.push((value, e.to_string()));
                }
            }
        }

        let existing = self.load_existing().await;

        let pending = missing_records(records, &existing);
        report.already_present = report.candidates - report.failed.len() - pending.len();

        if pending.is_empty() {
            log::info!("No new rows to insert");
            return report;
        }

        match self.store.insert_batch(&pending).await {
            Ok(outcome) => {
                report.inserted = outcome.inserted();
                report.duplicates = outcome.duplicates();
                for (record, reason) in outcome.failures() {
                    log::error!("Error inserting {}: {}", record, reason);
                    report.failed.push((record.to_string(), reason.to_string()));
                }
                log::info!(
                    "Inserted {} new rows ({} already present, {} ignored as duplicates, {} failed)",
                    report.inserted,
                    report.already_present,
                    report.duplicates,
                    report.failed.len()
                );
            }
            Err(e) => {
                log::error!("Insert batch of {} rows failed: {:#}", pending.len(), e);
                report.store_error = Some(format!("{:#}", e));
            }
        }

        report
    }

    /// Existing rows, or an empty set when they cannot be read. Inserting
    /// against an empty set is safe: conflicts are ignored by the store.
    async fn load_existing(&self) -> ExistingSet {
        match self.store.load_existing().await {
            Ok(existing) => existing,
            Err(e) => {
                log::warn!(
                    "Could not load existing rows, attempting all inserts: {:#}",
                    e
                );
                ExistingSet::new()
            }
        }
    }
}

/// Records not in `existing`, in snapshot order, each tuple at most once
pub fn missing_records(records: Vec<Record>, existing: &ExistingSet) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| !existing.contains(r) && seen.insert(r.clone()))
        .collect()
}
