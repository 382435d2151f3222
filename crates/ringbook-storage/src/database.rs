// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The `Database` struct IS the single writer; query modules accept
//! `&Database` and call through `connection().call()`. Do NOT create
//! additional Connection instances for writes.

use chrono::{DateTime, Utc};
use ringbook_core::RingbookError;
use tokio_rusqlite::Connection;
use tracing::info;

use crate::migrations;

/// Handle to the single-writer SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run all
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, RingbookError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| map_db_err(e.into()))?;

        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(map_db_err)?;

        info!(path, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the database, flushing WAL.
    pub async fn close(self) -> Result<(), RingbookError> {
        self.conn
            .close()
            .await
            .map_err(|e| RingbookError::Storage { source: Box::new(e) })
    }
}

/// Map a tokio-rusqlite error into the workspace error type.
pub(crate) fn map_db_err(err: tokio_rusqlite::Error) -> RingbookError {
    RingbookError::Storage {
        source: Box::new(err),
    }
}

/// Serialize a UTC timestamp to the canonical column format
/// (RFC3339, millisecond precision, lexically ordered).
pub fn ts_to_db(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Optional variant of [`ts_to_db`].
pub fn ts_opt_to_db(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(ts_to_db)
}

/// Parse a timestamp column, mapping failures to a rusqlite conversion
/// error so they surface through the normal query error path.
pub(crate) fn ts_from_db(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Optional variant of [`ts_from_db`].
pub(crate) fn ts_opt_from_db(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|r| ts_from_db(idx, r)).transpose()
}

/// Parse a text enum column via `FromStr`, mapping failures to a rusqlite
/// conversion error.
pub(crate) fn enum_from_db<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
