//! SQLite-backed store for local runs

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Connection;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection};
use std::path::PathBuf;

use super::{BatchOutcome, ExistingSet, PersistenceStore, sql};
use crate::models::Record;

const INSERT_RECORD: &str = "INSERT INTO person_data (name, age, yob)
    VALUES (?, ?, ?)
    ON CONFLICT (name, age, yob) DO NOTHING
    RETURNING name";

pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);
        SqliteConnection::connect_with(&options)
            .await
            .with_context(|| format!("Failed to open SQLite database: {}", self.path.display()))
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        sql::create_table::<Sqlite>(&mut conn).await?;
        conn.close().await.context("Failed to close connection")?;
        log::info!("Table person_data is ready in {}", self.path.display());
        Ok(())
    }

    async fn load_existing(&self) -> Result<ExistingSet> {
        let mut conn = self.connect().await?;
        let existing = sql::select_all::<Sqlite>(&mut conn).await?;
        conn.close().await.context("Failed to close connection")?;
        Ok(existing)
    }

    async fn insert_batch(&self, records: &[Record]) -> Result<BatchOutcome> {
        let mut conn = self.connect().await?;
        let outcome = sql::insert_all::<Sqlite>(&mut conn, INSERT_RECORD, records).await?;
        conn.close().await.context("Failed to close connection")?;
        Ok(outcome)
    }
}
