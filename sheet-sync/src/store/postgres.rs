//! Postgres-backed store

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection, Postgres};

use super::{BatchOutcome, ExistingSet, PersistenceStore, sql};
use crate::config::{self, DatabaseConfig, vars};
use crate::models::Record;

const INSERT_RECORD: &str = "INSERT INTO person_data (name, age, yob)
    VALUES ($1, $2, $3)
    ON CONFLICT (name, age, yob) DO NOTHING
    RETURNING name";

pub struct PostgresStore {
    config: DatabaseConfig,
}

impl PostgresStore {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// Connection options; missing settings are reported here, on first use
    fn connect_options(&self) -> Result<PgConnectOptions> {
        let db = &self.config;
        Ok(PgConnectOptions::new()
            .host(config::require(db.host.as_deref(), vars::DB_HOST)?)
            .port(db.port)
            .username(config::require(db.user.as_deref(), vars::DB_USER)?)
            .password(config::require(db.password.as_deref(), vars::DB_PASSWORD)?)
            .database(config::require(db.database.as_deref(), vars::DB_NAME)?))
    }

    async fn connect(&self) -> Result<PgConnection> {
        let options = self.connect_options()?;
        PgConnection::connect_with(&options)
            .await
            .context("Failed to connect to Postgres")
    }
}

#[async_trait]
impl PersistenceStore for PostgresStore {
    async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        sql::create_table::<Postgres>(&mut conn).await?;
        conn.close().await.context("Failed to close connection")?;
        log::info!("Table person_data is ready");
        Ok(())
    }

    async fn load_existing(&self) -> Result<ExistingSet> {
        let mut conn = self.connect().await?;
        let existing = sql::select_all::<Postgres>(&mut conn).await?;
        conn.close().await.context("Failed to close connection")?;
        Ok(existing)
    }

    async fn insert_batch(&self, records: &[Record]) -> Result<BatchOutcome> {
        let mut conn = self.connect().await?;
        let outcome = sql::insert_all::<Postgres>(&mut conn, INSERT_RECORD, records).await?;
        conn.close().await.context("Failed to close connection")?;
        Ok(outcome)
    }
}
