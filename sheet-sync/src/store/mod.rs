//! Persistence of reconciled records
//!
//! The `person_data` table carries a UNIQUE constraint over all three columns
//! and every insert uses `ON CONFLICT DO NOTHING`. That constraint is what
//! guarantees no duplicate rows; anything done in memory before an insert is
//! only there to skip work.

pub mod postgres;
mod sql;
pub mod sqlite;

#[cfg(test)]
pub mod memory;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::models::Record;

/// Records currently persisted, used for membership tests only
pub type ExistingSet = HashSet<Record>;

/// Result of inserting a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// The tuple already existed and the store ignored the insert
    Duplicate,
    /// The insert failed for this record only
    Failed(String),
}

/// Per-record results of one insert batch, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub results: Vec<(Record, InsertOutcome)>,
}

impl BatchOutcome {
    pub fn push(&mut self, record: Record, outcome: InsertOutcome) {
        self.results.push((record, outcome));
    }

    pub fn inserted(&self) -> usize {
        self.count(|o| matches!(o, InsertOutcome::Inserted))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, InsertOutcome::Duplicate))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Record, &str)> {
        self.results.iter().filter_map(|(r, o)| match o {
            InsertOutcome::Failed(msg) => Some((r, msg.as_str())),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&InsertOutcome) -> bool) -> usize {
        self.results.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Relational table holding the reconciled records.
///
/// Each call opens its own connection and closes it before returning; no
/// connection outlives a single operation.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Create the table and its uniqueness constraint if absent
    async fn ensure_schema(&self) -> Result<()>;

    /// Read every persisted record
    async fn load_existing(&self) -> Result<ExistingSet>;

    /// Insert records in one transaction, isolating each record's failure.
    ///
    /// `Err` means the batch as a whole could not run or commit (connection,
    /// begin, commit); per-record problems are reported in [`BatchOutcome`].
    async fn insert_batch(&self, records: &[Record]) -> Result<BatchOutcome>;
}

/// Pick the store backend from configuration: SQLite when a path is set,
/// Postgres otherwise
pub fn from_config(config: &DatabaseConfig) -> Arc<dyn PersistenceStore> {
    match &config.sqlite_path {
        Some(path) => Arc::new(SqliteStore::new(path.clone())),
        None => Arc::new(PostgresStore::new(config.clone())),
    }
}
