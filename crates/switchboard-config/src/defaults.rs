//! Default values for [`crate::BusSettings`] fields.

use crate::logging::LogFormat;

/// Prefix a slot name must carry before the binder wires it.
pub const DEFAULT_EVENT_SOURCE_PREFIX: &str = "publish";

/// Method name under which handler declarations are extracted.
pub const DEFAULT_HANDLER_METHOD_NAME: &str = "handle";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned slot prefix used where allocation is required (e.g. serde).
pub fn default_event_source_prefix() -> String {
    DEFAULT_EVENT_SOURCE_PREFIX.to_owned()
}

/// Owned handler method name used where allocation is required (e.g. serde).
pub fn default_handler_method_name() -> String {
    DEFAULT_HANDLER_METHOD_NAME.to_owned()
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
