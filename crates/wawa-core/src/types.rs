// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Wawa workspace.
//!
//! Persisted entity structs mirror the SQLite schema owned by `wawa-storage`;
//! status enums serialize to the SCREAMING_SNAKE_CASE strings stored in the
//! `status` columns.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a messaging device (one provider session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId(s.to_string())
    }
}

/// Provider-assigned identifier for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Connection state of a device.
///
/// `Banned` exists in the schema for the admin layer to set; this core never
/// transitions a device into it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Pairing,
    Connected,
    Disconnected,
    Banned,
}

/// Lifecycle state of a blast job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Delivery state of a single blast recipient.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
}

/// A persisted device row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Owning user, credited with commission on successful sends.
    pub user_id: String,
    pub phone_number: Option<String>,
    pub status: DeviceStatus,
    pub total_blast: i64,
    pub total_success: i64,
    pub total_failed: i64,
    pub last_active_at: Option<String>,
    pub connected_at: Option<String>,
    pub created_at: String,
}

/// A persisted blast job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastJob {
    pub id: String,
    pub device_id: DeviceId,
    pub message: String,
    pub status: JobStatus,
    pub sent_count: i64,
    pub failed_count: i64,
    pub recipient_count: i64,
    pub started_at: Option<String>,
    pub created_at: String,
}

/// A persisted blast recipient row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastRecipient {
    pub id: String,
    pub job_id: String,
    pub phone: String,
    pub status: RecipientStatus,
    pub sent_at: Option<String>,
    pub error_msg: Option<String>,
}

/// An entry in the delayed send queue.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    /// ISO 8601 timestamp before which the entry must not be claimed.
    pub run_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Structured outcome of a send attempt, returned instead of an error so the
/// caller always gets a uniform `{success, message_id?, error?}` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    pub success: bool,
    pub message_id: Option<MessageId>,
    pub error: Option<String>,
}

impl SendReport {
    pub fn ok(message_id: MessageId) -> Self {
        Self {
            success: true,
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Normalize a recipient phone number into a transport address: every
/// non-digit character is stripped before the provider suffix is applied
/// downstream.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}
