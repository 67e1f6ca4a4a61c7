//! Statements and batch logic shared by the SQL backends
//!
//! Each helper works on a connection the backend has already opened, so the
//! backends only differ in how they connect and in the placeholder syntax of
//! their insert statement. That statement must return a row only when one was
//! written, so a conflict shows up as no row.

use anyhow::{Context, Result};
use sqlx::{Connection, Database, Encode, Executor, FromRow, IntoArguments, Transaction, Type};

use super::{BatchOutcome, ExistingSet, InsertOutcome};
use crate::models::Record;

pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS person_data (
    name VARCHAR(50) NOT NULL,
    age INTEGER NOT NULL,
    yob INTEGER NOT NULL,
    UNIQUE (name, age, yob)
)";

pub const SELECT_ALL: &str = "SELECT name, age, yob FROM person_data";

pub async fn create_table<DB>(conn: &mut DB::Connection) -> Result<()>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
{
    sqlx::query::<DB>(CREATE_TABLE)
        .execute(&mut *conn)
        .await
        .context("Failed to create person_data table")?;
    Ok(())
}

pub async fn select_all<DB>(conn: &mut DB::Connection) -> Result<ExistingSet>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'r> (String, i32, i32): FromRow<'r, DB::Row>,
{
    let rows: Vec<(String, i32, i32)> = sqlx::query_as::<DB, (String, i32, i32)>(SELECT_ALL)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to read existing rows from person_data")?;

    Ok(rows
        .into_iter()
        .map(|(name, age, yob)| Record::new(name, age, yob))
        .collect())
}

/// Insert every record in one transaction, one savepoint per record
pub async fn insert_all<DB>(
    conn: &mut DB::Connection,
    insert_sql: &str,
    records: &[Record],
) -> Result<BatchOutcome>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'q> String: Encode<'q, DB> + Type<DB>,
    for<'q> i32: Encode<'q, DB> + Type<DB>,
{
    let mut tx = conn.begin().await.context("Failed to begin transaction")?;

    let mut outcome = BatchOutcome::default();
    for record in records {
        let result = insert_one::<DB>(&mut tx, insert_sql, record).await;
        outcome.push(record.clone(), result);
    }

    tx.commit().await.context("Failed to commit insert batch")?;
    Ok(outcome)
}

/// Insert one record inside its own savepoint so a failure rolls back only
/// that record and leaves the outer transaction usable
async fn insert_one<DB>(
    tx: &mut Transaction<'_, DB>,
    insert_sql: &str,
    record: &Record,
) -> InsertOutcome
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'q> String: Encode<'q, DB> + Type<DB>,
    for<'q> i32: Encode<'q, DB> + Type<DB>,
{
    let mut savepoint = match tx.begin().await {
        Ok(sp) => sp,
        Err(e) => return InsertOutcome::Failed(format!("savepoint failed: {}", e)),
    };

    let result = sqlx::query::<DB>(insert_sql)
        .bind(record.name.clone())
        .bind(record.age)
        .bind(record.year_of_birth)
        .fetch_optional(&mut *savepoint)
        .await;

    match result {
        Ok(returned) => match savepoint.commit().await {
            Ok(()) if returned.is_none() => InsertOutcome::Duplicate,
            Ok(()) => InsertOutcome::Inserted,
            Err(e) => InsertOutcome::Failed(format!("release savepoint failed: {}", e)),
        },
        Err(e) => {
            // Dropping the savepoint would also roll back; do it explicitly to surface errors
            if let Err(rb) = savepoint.rollback().await {
                log::debug!("Rollback to savepoint failed for {}: {}", record, rb);
            }
            InsertOutcome::Failed(e.to_string())
        }
    }
}
