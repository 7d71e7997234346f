//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
use std::{env, str::FromStr};

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteRow, Error as SqlxError, Row, SqlitePool};

use crate::db_types::ConversionError;

pub mod events;
pub mod notifications;
pub mod order_counters;
pub mod orders;
pub mod tasks;
pub mod workflow_actions;

const SQLITE_DB_URL: &str = "sqlite://data/order_workflow.db";

pub fn db_url() -> String {
    let result = env::var("OWF_DATABASE_URL").unwrap_or_else(|_| {
        info!("OWF_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Reads a text column and parses it into one of the string-backed enums in [`crate::db_types`].
pub(crate) fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, SqlxError>
where T: FromStr<Err = ConversionError> {
    let value: String = row.try_get(column)?;
    value.parse().map_err(|e: ConversionError| SqlxError::ColumnDecode { index: column.to_string(), source: Box::new(e) })
}
