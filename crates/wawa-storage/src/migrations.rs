// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations.
//!
//! SQL migration files live in the crate-level `migrations/` directory and
//! are compiled into the binary via `refinery::embed_migrations!`. They run
//! automatically when a [`crate::Database`] is opened.

use refinery::embed_migrations;
use tracing::debug;
use wawa_core::WawaError;

embed_migrations!("migrations");

/// Run all pending migrations against the given connection.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), WawaError> {
    let report = migrations::runner()
        .run(conn)
        .map_err(|e| WawaError::Storage {
            source: Box::new(e),
        })?;
    debug!(
        applied = report.applied_migrations().len(),
        "schema migrations applied"
    );
    Ok(())
}
