// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and positive retry budgets.

use crate::diagnostic::ConfigError;
use crate::model::WawaConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &WawaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.blast.max_attempts < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "blast.max_attempts must be at least 1, got {}",
                config.blast.max_attempts
            ),
        });
    }

    if config.blast.rate_limit_max < 1 {
        errors.push(ConfigError::Validation {
            message: "blast.rate_limit_max must be at least 1".to_string(),
        });
    }

    if config.blast.rate_limit_window_ms < 1 {
        errors.push(ConfigError::Validation {
            message: "blast.rate_limit_window_ms must be at least 1".to_string(),
        });
    }

    if config.blast.commission_amount < 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "blast.commission_amount must be non-negative, got {}",
                config.blast.commission_amount
            ),
        });
    }

    if config.session.event_buffer < 1 {
        errors.push(ConfigError::Validation {
            message: "session.event_buffer must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = WawaConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = WawaConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn zero_max_attempts_fails_validation() {
        let mut config = WawaConfig::default();
        config.blast.max_attempts = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("max_attempts"))));
    }

    #[test]
    fn negative_commission_fails_validation() {
        let mut config = WawaConfig::default();
        config.blast.commission_amount = -1;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("commission_amount"))));
    }
}
