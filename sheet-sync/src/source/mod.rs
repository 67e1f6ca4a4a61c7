//! Record sources: where snapshots come from

pub mod sheets;

pub use sheets::SheetsSource;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Row;

/// Fetch the current full contents of the source, header row included.
///
/// Any failure is returned as `Err`; implementations never hand back partial
/// data and never retry on their own.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Row>>;
}
