// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration error diagnostics rendered through miette.

use miette::Diagnostic;
use thiserror::Error;

/// A configuration error with diagnostic help text.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// Figment failed to deserialize the merged configuration.
    #[error("configuration could not be loaded: {message}")]
    #[diagnostic(
        code(wawa::config::load),
        help("check wawa.toml against the documented keys; unknown keys are rejected")
    )]
    Load {
        /// The underlying figment error rendering.
        message: String,
    },

    /// A semantic validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(wawa::config::validation))]
    Validation {
        /// Description of the failed constraint.
        message: String,
    },
}

/// Render a list of configuration errors to stderr via miette's fancy
/// reporter.
pub fn render_errors(errors: &[ConfigError]) {
    for err in errors {
        eprintln!("{:?}", miette::Report::msg(err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_message() {
        let err = ConfigError::Validation {
            message: "blast.max_attempts must be at least 1".into(),
        };
        assert!(err.to_string().contains("max_attempts"));
    }
}
