//! Shared settings for the switchboard message bus.
//!
//! The engine crate lifts [`BusSettings`] into its runtime options; hosts use
//! the same document to drive logging through [`LogFormat`] and the filter
//! expression.

pub mod defaults;
mod error;
mod logging;
mod settings;

pub use self::error::ConfigError;
pub use self::logging::{LogFormat, LogFormatParseError};
pub use self::settings::BusSettings;
