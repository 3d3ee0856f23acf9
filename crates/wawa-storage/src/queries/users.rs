// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User account operations.
//!
//! Wallet credits happen inside the blast accounting transactions in
//! [`crate::queries::blasts`]; this module only covers row creation and
//! balance reads.

use rusqlite::params;
use wawa_core::WawaError;

use crate::database::Database;

/// Insert a user row with a zero wallet balance.
pub async fn insert_user(db: &Database, user_id: &str) -> Result<(), WawaError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("INSERT INTO users (id) VALUES (?1)", params![user_id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Current wallet balance for a user.
pub async fn wallet_balance(db: &Database, user_id: &str) -> Result<i64, WawaError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT wallet_balance FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_user_starts_with_zero_balance() {
        let db = Database::open_in_memory().await.unwrap();
        insert_user(&db, "user-1").await.unwrap();
        assert_eq!(wallet_balance(&db, "user-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_user_balance_is_an_error() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(wallet_balance(&db, "ghost").await.is_err());
    }
}
