// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./wawa.toml` > `~/.config/wawa/wawa.toml` >
//! `/etc/wawa/wawa.toml` with environment variable overrides via the
//! `WAWA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::WawaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wawa/wawa.toml` (system-wide)
/// 3. `~/.config/wawa/wawa.toml` (user XDG config)
/// 4. `./wawa.toml` (local directory)
/// 5. `WAWA_*` environment variables
pub fn load_config() -> Result<WawaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WawaConfig::default()))
        .merge(Toml::file("/etc/wawa/wawa.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("wawa/wawa.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("wawa.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<WawaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WawaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WawaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WawaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `WAWA_BLAST_RATE_LIMIT_MAX` must map to
/// `blast.rate_limit_max`, not `blast.rate.limit.max`.
fn env_provider() -> Env {
    Env::prefixed("WAWA_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("session_", "session.", 1)
            .replacen("blast_", "blast.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn loads_defaults_from_empty_string() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.agent.name, "wawa");
        assert_eq!(config.blast.rate_limit_max, 30);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[session]
reconnect_max_attempts = 10
"#,
        )
        .unwrap();
        assert_eq!(config.session.reconnect_max_attempts, 10);
        assert_eq!(config.session.reconnect_base_delay_ms, 3000);
    }

    #[test]
    #[serial]
    fn env_var_overrides_file() {
        let dir = std::env::temp_dir().join("wawa-config-env-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wawa.toml");
        std::fs::write(&path, "[blast]\nrate_limit_max = 5\n").unwrap();

        // SAFETY: test is serialized; no other thread reads the environment.
        unsafe { std::env::set_var("WAWA_BLAST_RATE_LIMIT_MAX", "7") };
        let config = load_config_from_path(&path).unwrap();
        unsafe { std::env::remove_var("WAWA_BLAST_RATE_LIMIT_MAX") };

        assert_eq!(config.blast.rate_limit_max, 7);
    }
}
