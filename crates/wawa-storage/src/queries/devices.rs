// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device row and credential blob operations.
//!
//! Connection state transitions persisted here mirror what the live
//! registry in `wawa-session` holds in memory: PAIRING on connect start,
//! CONNECTED once the transport reports open, DISCONNECTED on close.

use rusqlite::params;
use wawa_core::{WawaError, types::DeviceId};

use crate::database::Database;
use crate::models::{Device, DeviceStatus};

const DEVICE_COLUMNS: &str = "id, user_id, phone_number, status, total_blast, \
     total_success, total_failed, last_active_at, connected_at, created_at";

fn row_to_device(row: &rusqlite::Row<'_>) -> Result<Device, rusqlite::Error> {
    let status_raw: String = row.get(3)?;
    let status: DeviceStatus = status_raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Device {
        id: DeviceId(row.get(0)?),
        user_id: row.get(1)?,
        phone_number: row.get(2)?,
        status,
        total_blast: row.get(4)?,
        total_success: row.get(5)?,
        total_failed: row.get(6)?,
        last_active_at: row.get(7)?,
        connected_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Insert a device row owned by `user_id`, initially DISCONNECTED.
pub async fn insert_device(
    db: &Database,
    device_id: &DeviceId,
    user_id: &str,
) -> Result<(), WawaError> {
    let device_id = device_id.0.clone();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO devices (id, user_id) VALUES (?1, ?2)",
                params![device_id, user_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Look up a device row by id.
pub async fn find_device(db: &Database, device_id: &DeviceId) -> Result<Option<Device>, WawaError> {
    let device_id = device_id.0.clone();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1"),
                params![device_id],
                row_to_device,
            );
            match result {
                Ok(device) => Ok(Some(device)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All device rows, ordered by creation time. Used at startup to restore
/// sessions that have stored credentials.
pub async fn list_devices(db: &Database) -> Result<Vec<Device>, WawaError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM devices ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_device)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the status column for a device.
pub async fn set_status(
    db: &Database,
    device_id: &DeviceId,
    status: DeviceStatus,
) -> Result<(), WawaError> {
    let device_id = device_id.0.clone();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE devices SET status = ?1 WHERE id = ?2",
                params![status, device_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a device CONNECTED and record its provider phone number and the
/// connection timestamp.
pub async fn mark_connected(
    db: &Database,
    device_id: &DeviceId,
    phone_number: &str,
) -> Result<(), WawaError> {
    let device_id = device_id.0.clone();
    let phone_number = phone_number.to_string();
    let now = crate::database::now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE devices SET status = 'CONNECTED', phone_number = ?1,
                 connected_at = ?2, last_active_at = ?2
                 WHERE id = ?3",
                params![phone_number, now, device_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a device DISCONNECTED, keeping its counters and phone number.
pub async fn mark_disconnected(db: &Database, device_id: &DeviceId) -> Result<(), WawaError> {
    set_status(db, device_id, DeviceStatus::Disconnected).await
}

/// Upsert the opaque credential blob for a device.
pub async fn store_credentials(
    db: &Database,
    device_id: &DeviceId,
    blob: Vec<u8>,
) -> Result<(), WawaError> {
    let device_id = device_id.0.clone();
    let now = crate::database::now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO credentials (device_id, blob, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(device_id) DO UPDATE SET blob = ?2, updated_at = ?3",
                params![device_id, blob, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Load the stored credential blob for a device, if any.
pub async fn load_credentials(
    db: &Database,
    device_id: &DeviceId,
) -> Result<Option<Vec<u8>>, WawaError> {
    let device_id = device_id.0.clone();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT blob FROM credentials WHERE device_id = ?1",
                params![device_id],
                |row| row.get(0),
            );
            match result {
                Ok(blob) => Ok(Some(blob)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete the credential blob for a device. Called on logout so the next
/// connect starts a fresh pairing.
pub async fn purge_credentials(db: &Database, device_id: &DeviceId) -> Result<(), WawaError> {
    let device_id = device_id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM credentials WHERE device_id = ?1",
                params![device_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
