//! Errors raised while loading bus settings.

use thiserror::Error;

/// Errors arising from settings parsing and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings document could not be deserialised.
    #[error("failed to parse bus settings: {0}")]
    Parse(#[source] serde_json::Error),

    /// A field holds a value the bus cannot work with.
    #[error("invalid bus setting '{field}': {message}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },
}

impl ConfigError {
    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
