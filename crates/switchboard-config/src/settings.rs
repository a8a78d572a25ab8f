//! Serialisable bus settings.

use serde::{Deserialize, Serialize};

use crate::defaults::{
    default_event_source_prefix, default_handler_method_name, default_log_filter_string,
    default_log_format,
};
use crate::error::ConfigError;
use crate::logging::LogFormat;

/// Plain-data settings for a message bus and its host's logging.
///
/// Every field has a default, so an empty document yields
/// [`BusSettings::default`].
///
/// # Example
///
/// ```
/// use switchboard_config::BusSettings;
///
/// let settings = BusSettings::from_json_str(r#"{"discover": true}"#)
///     .expect("valid settings");
/// assert!(settings.discover());
/// assert_eq!(settings.handler_method_name(), "handle");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSettings {
    discover: bool,
    #[serde(default = "default_event_source_prefix")]
    event_source_prefix: String,
    #[serde(default = "default_handler_method_name")]
    handler_method_name: String,
    #[serde(default = "default_log_filter_string")]
    log_filter: String,
    #[serde(default = "default_log_format")]
    log_format: LogFormat,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            discover: false,
            event_source_prefix: default_event_source_prefix(),
            handler_method_name: default_handler_method_name(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl BusSettings {
    /// Parses settings from a JSON document and validates them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is not valid JSON or
    /// carries unknown fields, and [`ConfigError::Invalid`] when a naming
    /// convention is blank.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(input).map_err(ConfigError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that the naming conventions can match anything.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_source_prefix.trim().is_empty() {
            return Err(ConfigError::invalid(
                "event_source_prefix",
                "must not be blank",
            ));
        }
        if self.handler_method_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "handler_method_name",
                "must not be blank",
            ));
        }
        Ok(())
    }

    /// Whether `configure` discovers types from the candidate catalogue.
    #[must_use]
    pub const fn discover(&self) -> bool {
        self.discover
    }

    /// Prefix a slot name must start with to be bound.
    #[must_use]
    pub fn event_source_prefix(&self) -> &str {
        &self.event_source_prefix
    }

    /// Method name under which handlers are extracted.
    #[must_use]
    pub fn handler_method_name(&self) -> &str {
        &self.handler_method_name
    }

    /// Log filter expression in `EnvFilter` syntax.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns a copy with discovery switched on or off.
    #[must_use]
    pub fn with_discover(mut self, discover: bool) -> Self {
        self.discover = discover;
        self
    }

    /// Returns a copy with a different slot prefix.
    #[must_use]
    pub fn with_event_source_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_source_prefix = prefix.into();
        self
    }

    /// Returns a copy with a different handler method name.
    #[must_use]
    pub fn with_handler_method_name(mut self, name: impl Into<String>) -> Self {
        self.handler_method_name = name.into();
        self
    }

    /// Returns a copy with a different log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Returns a copy with a different log format.
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}
