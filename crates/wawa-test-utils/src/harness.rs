// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database seeding helpers for integration tests.

use wawa_core::types::DeviceId;
use wawa_storage::Database;
use wawa_storage::queries::{devices, users};

/// Open an in-memory database with the full schema applied.
pub async fn memory_db() -> Database {
    Database::open_in_memory()
        .await
        .expect("in-memory database")
}

/// Insert a user and a device owned by it. Returns the device id.
pub async fn seed_user_device(db: &Database, user_id: &str, device_id: &str) -> DeviceId {
    users::insert_user(db, user_id).await.expect("insert user");
    let device_id = DeviceId::from(device_id);
    devices::insert_device(db, &device_id, user_id)
        .await
        .expect("insert device");
    device_id
}
