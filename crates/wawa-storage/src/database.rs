// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with WAL mode and embedded migrations.
//!
//! A [`Database`] wraps exactly one `tokio_rusqlite::Connection`, which runs
//! every closure on a single background thread. That connection is the only
//! writer in the process: query modules take `&Database` and go through
//! [`Database::connection`], never a second `Connection`, which keeps
//! `SQLITE_BUSY` out of the picture under concurrent tasks.

use tracing::info;
use wawa_core::WawaError;

/// Handle to the single SQLite connection used by the whole process.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run all
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, WawaError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| WawaError::Storage {
                source: Box::new(e),
            })?;
        let db = Self::init(conn).await?;
        info!(path, "database opened");
        Ok(db)
    }

    /// Open an in-memory database with the full schema. Used by tests and
    /// throwaway tooling.
    pub async fn open_in_memory() -> Result<Self, WawaError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| WawaError::Storage {
                source: Box::new(e),
            })?;
        Self::init(conn).await
    }

    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self, WawaError> {
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| crate::migrations::run_migrations(conn))
            .await
            .map_err(|e| WawaError::Storage {
                source: Box::new(e),
            })?;

        Ok(Self { conn })
    }

    /// Access the underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Close the connection, flushing the WAL.
    pub async fn close(self) -> Result<(), WawaError> {
        self.conn.close().await.map_err(|e| WawaError::Storage {
            source: Box::new(e),
        })
    }
}

/// Convert a tokio-rusqlite error into `WawaError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> WawaError {
    WawaError::Storage {
        source: Box::new(e),
    }
}

/// Current UTC time as an ISO 8601 string with millisecond precision.
///
/// All row timestamps are generated here rather than in SQL so that callers
/// (and tests) control the clock through one seam.
pub fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// ISO 8601 timestamp `ms` milliseconds from now.
pub fn iso_after_ms(ms: u64) -> String {
    (chrono::Utc::now() + chrono::Duration::milliseconds(ms as i64))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
