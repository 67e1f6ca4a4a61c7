//! In-memory store used by reconciler and sync loop tests

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{BatchOutcome, ExistingSet, InsertOutcome, PersistenceStore};
use crate::models::Record;

/// Mirrors the table's uniqueness rule and counts every call
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Record>>,
    /// Names whose insert fails as if the data were rejected
    rejected_names: Mutex<HashSet<String>>,
    pub fail_load: AtomicBool,
    pub fail_batch: AtomicBool,
    pub schema_calls: AtomicUsize,
    pub load_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub insert_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<Record>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn reject_name(&self, name: &str) {
        self.rejected_names.lock().unwrap().insert(name.to_string());
    }

    pub fn rows(&self) -> Vec<Record> {
        self.rows.lock().unwrap().clone()
    }

    /// Total number of store operations performed
    pub fn operations(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
            + self.load_calls.load(Ordering::SeqCst)
            + self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_existing(&self) -> Result<ExistingSet> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(self.rows.lock().unwrap().iter().cloned().collect())
    }

    async fn insert_batch(&self, records: &[Record]) -> Result<BatchOutcome> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch.load(Ordering::SeqCst) {
            bail!("connection refused");
        }

        let rejected = self.rejected_names.lock().unwrap().clone();
        let mut rows = self.rows.lock().unwrap();
        let mut outcome = BatchOutcome::default();

        for record in records {
            self.insert_attempts.fetch_add(1, Ordering::SeqCst);
            let result = if rejected.contains(&record.name) {
                InsertOutcome::Failed(format!("value rejected: {}", record.name))
            } else if rows.contains(record) {
                InsertOutcome::Duplicate
            } else {
                rows.push(record.clone());
                InsertOutcome::Inserted
            };
            outcome.push(record.clone(), result);
        }

        Ok(outcome)
    }
}
