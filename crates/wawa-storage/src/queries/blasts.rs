// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blast job and recipient accounting.
//!
//! Every outcome of a send attempt is recorded in a single transaction so
//! that recipient status, job counters, device counters, and the owner's
//! wallet can never drift apart. Success recording is guarded by the
//! recipient's current status, making commission crediting at-most-once
//! even if the same delivery is reported twice.

use rusqlite::params;
use wawa_core::{WawaError, types::DeviceId};

use crate::database::Database;
use crate::models::{BlastJob, BlastRecipient, JobStatus, RecipientStatus};

/// Create a blast job with its recipient rows in one transaction.
///
/// `recipients` pairs a caller-generated recipient id with the raw phone
/// string. The job starts PENDING with `recipient_count` fixed at creation.
pub async fn create_job(
    db: &Database,
    job_id: &str,
    device_id: &DeviceId,
    message: &str,
    recipients: &[(String, String)],
) -> Result<(), WawaError> {
    let job_id = job_id.to_string();
    let device_id = device_id.0.clone();
    let message = message.to_string();
    let recipients = recipients.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO blast_jobs (id, device_id, message, recipient_count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![job_id, device_id, message, recipients.len() as i64],
            )?;
            for (recipient_id, phone) in &recipients {
                tx.execute(
                    "INSERT INTO blast_recipients (id, job_id, phone) VALUES (?1, ?2, ?3)",
                    params![recipient_id, job_id, phone],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move a job to PROCESSING and stamp `started_at` on the first call.
pub async fn mark_processing(db: &Database, job_id: &str) -> Result<(), WawaError> {
    let job_id = job_id.to_string();
    let now = crate::database::now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE blast_jobs SET status = 'PROCESSING',
                 started_at = COALESCE(started_at, ?1)
                 WHERE id = ?2 AND status IN ('PENDING', 'PROCESSING')",
                params![now, job_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a confirmed delivery in one transaction.
///
/// Marks the recipient SENT, bumps the job's `sent_count`, the device's
/// `total_blast`/`total_success`, credits `commission` to the owning user's
/// wallet, and finalizes the job if this was the last outstanding recipient.
///
/// Returns `false` without touching counters when the recipient was already
/// SENT, so a redelivered queue entry cannot double-credit.
pub async fn record_send_success(
    db: &Database,
    job_id: &str,
    recipient_id: &str,
    device_id: &DeviceId,
    commission: i64,
) -> Result<bool, WawaError> {
    let job_id = job_id.to_string();
    let recipient_id = recipient_id.to_string();
    let device_id = device_id.0.clone();
    let now = crate::database::now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let claimed = tx.execute(
                "UPDATE blast_recipients SET status = 'SENT', sent_at = ?1, error_msg = NULL
                 WHERE id = ?2 AND status != 'SENT'",
                params![now, recipient_id],
            )?;
            if claimed == 0 {
                tx.commit()?;
                return Ok(false);
            }

            tx.execute(
                "UPDATE blast_jobs SET sent_count = sent_count + 1 WHERE id = ?1",
                params![job_id],
            )?;
            tx.execute(
                "UPDATE devices SET total_blast = total_blast + 1,
                 total_success = total_success + 1, last_active_at = ?1
                 WHERE id = ?2",
                params![now, device_id],
            )?;

            let user_id: String = tx.query_row(
                "SELECT user_id FROM devices WHERE id = ?1",
                params![device_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE users SET wallet_balance = wallet_balance + ?1 WHERE id = ?2",
                params![commission, user_id],
            )?;

            finalize_if_complete(&tx, &job_id)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the error of a non-terminal attempt on the recipient row.
///
/// The recipient stays PENDING and no counters move; the error string is
/// kept for operator visibility while the queue retries.
pub async fn record_attempt_error(
    db: &Database,
    recipient_id: &str,
    error: &str,
) -> Result<(), WawaError> {
    let recipient_id = recipient_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE blast_recipients SET error_msg = ?1
                 WHERE id = ?2 AND status = 'PENDING'",
                params![error, recipient_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a terminal failure (all retries exhausted) in one transaction.
///
/// Marks the recipient FAILED, bumps the job's `failed_count` and the
/// device's `total_failed`, and finalizes the job if complete. Returns
/// `false` when the recipient had already left the PENDING state.
pub async fn record_send_failure(
    db: &Database,
    job_id: &str,
    recipient_id: &str,
    device_id: &DeviceId,
    error: &str,
) -> Result<bool, WawaError> {
    let job_id = job_id.to_string();
    let recipient_id = recipient_id.to_string();
    let device_id = device_id.0.clone();
    let error = error.to_string();
    let now = crate::database::now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let claimed = tx.execute(
                "UPDATE blast_recipients SET status = 'FAILED', error_msg = ?1
                 WHERE id = ?2 AND status = 'PENDING'",
                params![error, recipient_id],
            )?;
            if claimed == 0 {
                tx.commit()?;
                return Ok(false);
            }

            tx.execute(
                "UPDATE blast_jobs SET failed_count = failed_count + 1 WHERE id = ?1",
                params![job_id],
            )?;
            tx.execute(
                "UPDATE devices SET total_blast = total_blast + 1,
                 total_failed = total_failed + 1, last_active_at = ?1
                 WHERE id = ?2",
                params![now, device_id],
            )?;

            finalize_if_complete(&tx, &job_id)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Finalize the job once every recipient has a terminal status: COMPLETED
/// if anything was delivered, FAILED otherwise.
fn finalize_if_complete(
    tx: &rusqlite::Transaction<'_>,
    job_id: &str,
) -> Result<(), rusqlite::Error> {
    let (sent, failed, total): (i64, i64, i64) = tx.query_row(
        "SELECT sent_count, failed_count, recipient_count FROM blast_jobs WHERE id = ?1",
        params![job_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    if total > 0 && sent + failed >= total {
        let status = if sent > 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        tx.execute(
            "UPDATE blast_jobs SET status = ?1 WHERE id = ?2",
            params![status.to_string(), job_id],
        )?;
    }
    Ok(())
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<BlastJob, rusqlite::Error> {
    let status_raw: String = row.get(3)?;
    let status: JobStatus = status_raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(BlastJob {
        id: row.get(0)?,
        device_id: DeviceId(row.get(1)?),
        message: row.get(2)?,
        status,
        sent_count: row.get(4)?,
        failed_count: row.get(5)?,
        recipient_count: row.get(6)?,
        started_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Look up a blast job by id.
pub async fn find_job(db: &Database, job_id: &str) -> Result<Option<BlastJob>, WawaError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT id, device_id, message, status, sent_count, failed_count,
                        recipient_count, started_at, created_at
                 FROM blast_jobs WHERE id = ?1",
                params![job_id],
                row_to_job,
            );
            match result {
                Ok(job) => Ok(Some(job)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All recipient rows for a job, in insertion order.
pub async fn recipients_for_job(
    db: &Database,
    job_id: &str,
) -> Result<Vec<BlastRecipient>, WawaError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, job_id, phone, status, sent_at, error_msg
                 FROM blast_recipients WHERE job_id = ?1 ORDER BY rowid ASC",
            )?;
            let rows = stmt.query_map(params![job_id], |row| {
                let status_raw: String = row.get(3)?;
                let status: RecipientStatus = status_raw.parse().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(BlastRecipient {
                    id: row.get(0)?,
                    job_id: row.get(1)?,
                    phone: row.get(2)?,
                    status,
                    sent_at: row.get(4)?,
                    error_msg: row.get(5)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
