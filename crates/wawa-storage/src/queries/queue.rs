// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delayed queue operations for staggered, retried sends.
//!
//! Entries carry a `run_at` timestamp; `claim_ready` only hands out entries
//! whose `run_at` has passed, which is how per-recipient stagger delays and
//! exponential retry backoff are both expressed.

use rusqlite::params;
use wawa_core::WawaError;

use crate::database::Database;
use crate::models::QueueEntry;

/// Outcome of [`fail`]: either the entry was rescheduled or its retry
/// budget is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Entry went back to pending with a backed-off `run_at`.
    Retry { attempts: i32, run_at: String },
    /// Entry is permanently failed; the caller must record the terminal
    /// failure against the blast recipient.
    Exhausted { attempts: i32 },
}

/// Enqueue a payload to become claimable after `delay_ms`. Returns the
/// auto-generated queue entry ID.
pub async fn enqueue(
    db: &Database,
    payload: &str,
    delay_ms: u64,
    max_attempts: i32,
) -> Result<i64, WawaError> {
    let payload = payload.to_string();
    let run_at = crate::database::iso_after_ms(delay_ms);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO send_queue (payload, max_attempts, run_at) VALUES (?1, ?2, ?3)",
                params![payload, max_attempts, run_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim the next pending entry whose `run_at` has passed.
///
/// Atomically selects the due entry with the earliest `run_at` and marks it
/// "processing". Returns `None` when nothing is due.
pub async fn claim_ready(db: &Database) -> Result<Option<QueueEntry>, WawaError> {
    let now = crate::database::now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(
                    "SELECT id, payload, status, attempts, max_attempts,
                            run_at, created_at, updated_at
                     FROM send_queue
                     WHERE status = 'pending' AND run_at <= ?1
                     ORDER BY run_at ASC, id ASC
                     LIMIT 1",
                )?;
                stmt.query_row(params![now], |row| {
                    Ok(QueueEntry {
                        id: row.get(0)?,
                        payload: row.get(1)?,
                        status: row.get(2)?,
                        attempts: row.get(3)?,
                        max_attempts: row.get(4)?,
                        run_at: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                })
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE send_queue SET status = 'processing', updated_at = ?1
                         WHERE id = ?2",
                        params![now, entry.id],
                    )?;
                    tx.commit()?;
                    Ok(Some(QueueEntry {
                        status: "processing".to_string(),
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge successful processing of a queue entry.
pub async fn ack(db: &Database, id: i64) -> Result<(), WawaError> {
    let now = crate::database::now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE send_queue SET status = 'completed', updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark an attempt on a queue entry as failed.
///
/// Increments attempts. Below the budget the entry returns to pending with
/// `run_at` pushed out exponentially (`backoff_base_ms * 2^(attempts - 1)`);
/// at the budget it is marked permanently failed.
pub async fn fail(db: &Database, id: i64, backoff_base_ms: u64) -> Result<FailOutcome, WawaError> {
    let now = crate::database::now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let (attempts, max_attempts): (i32, i32) = tx.query_row(
                "SELECT attempts, max_attempts FROM send_queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            let outcome = if new_attempts >= max_attempts {
                tx.execute(
                    "UPDATE send_queue SET status = 'failed', attempts = ?1, updated_at = ?2
                     WHERE id = ?3",
                    params![new_attempts, now, id],
                )?;
                FailOutcome::Exhausted {
                    attempts: new_attempts,
                }
            } else {
                let shift = (new_attempts - 1).min(16) as u32;
                let delay_ms = backoff_base_ms.saturating_mul(1u64 << shift);
                let run_at = crate::database::iso_after_ms(delay_ms);
                tx.execute(
                    "UPDATE send_queue SET status = 'pending', attempts = ?1,
                     run_at = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![new_attempts, run_at, now, id],
                )?;
                FailOutcome::Retry {
                    attempts: new_attempts,
                    run_at,
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count of entries still pending or processing. Used by shutdown to report
/// unfinished work.
pub async fn outstanding(db: &Database) -> Result<i64, WawaError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM send_queue WHERE status IN ('pending', 'processing')",
                [],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}
