// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Wawa blast platform.

use thiserror::Error;

use crate::types::DeviceId;

/// The primary error type used across all Wawa crates.
#[derive(Debug, Error)]
pub enum WawaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No device with the given id is registered with the connection registry.
    #[error("device not registered: {device_id}")]
    DeviceNotRegistered { device_id: DeviceId },

    /// The device exists but is not in the CONNECTED state.
    #[error("device not connected: {device_id}")]
    DeviceNotConnected { device_id: DeviceId },

    /// Transport-level errors (session initialization, send failure, logout).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Pairing-code request failed. Non-fatal: pairing simply does not progress.
    #[error("pairing error: {message}")]
    Pairing { message: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WawaError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        WawaError::Transport {
            message: message.into(),
            source: None,
        }
    }
}
