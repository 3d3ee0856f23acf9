// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Wawa blast platform.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Wawa configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WawaConfig {
    /// Process identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Device session and reconnection settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Blast dispatch, retry, and rate limit settings.
    #[serde(default)]
    pub blast: BlastConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the service instance.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "wawa".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Device session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Delay before requesting a numeric pairing code, giving the transport
    /// handshake time to reach a state that accepts the request.
    #[serde(default = "default_pairing_code_delay_ms")]
    pub pairing_code_delay_ms: u64,

    /// Base delay for the supervised reconnect backoff. Each attempt doubles it.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Maximum reconnect attempts after a transient close before giving up.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,

    /// Capacity of each device's event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pairing_code_delay_ms: default_pairing_code_delay_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_pairing_code_delay_ms() -> u64 {
    3000
}

fn default_reconnect_base_delay_ms() -> u64 {
    3000
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

fn default_event_buffer() -> usize {
    64
}

/// Blast dispatch, retry, and rate limit configuration.
///
/// The defaults mirror the provider-safe limits: 30 sends per minute across
/// all devices and a 2 second stagger between recipients of one job.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BlastConfig {
    /// Per-recipient scheduling offset within one job.
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Total attempts per send task (first try plus retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for the exponential retry backoff.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Maximum sends allowed inside one rolling window, across all devices.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: usize,

    /// Width of the rolling rate limit window.
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    /// Wallet credit applied to the device owner per successfully sent
    /// recipient.
    #[serde(default = "default_commission_amount")]
    pub commission_amount: i64,

    /// Worker poll interval for claiming ready queue entries.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for BlastConfig {
    fn default() -> Self {
        Self {
            stagger_ms: default_stagger_ms(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            commission_amount: default_commission_amount(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_stagger_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    5000
}

fn default_rate_limit_max() -> usize {
    30
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_commission_amount() -> i64 {
    25
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "wawa.db".to_string()
}
