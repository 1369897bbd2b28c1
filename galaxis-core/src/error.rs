//! Error handling for the Galaxis core layer.
//!
//! The foundation crate owns two error types, one per fallible concern it
//! implements: configuration loading and logging initialization. The
//! rendering and UI crates define their own error enums; nothing here
//! wraps them.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for configuration loading and parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file: {0}")]
    FileRead(#[source] io::Error),

    /// The configuration file contains invalid TOML.
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configuration value is outside its valid range.
    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted key of the offending value.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Error type for logging initialization.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("Failed to create log directory: {0}")]
    DirectoryCreation(#[source] io::Error),

    /// The requested log format is not recognized.
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),

    /// A global subscriber was already installed.
    #[error("Global logging subscriber already set")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_name_the_file() {
        let err = ConfigError::FileNotFound(PathBuf::from("engine.toml"));
        assert!(err.to_string().contains("engine.toml"));
    }

    #[test]
    fn invalid_value_reports_key_and_reason() {
        let err = ConfigError::InvalidValue {
            key: "window.width".to_string(),
            reason: "must be non-zero".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("window.width"));
        assert!(rendered.contains("must be non-zero"));
    }

    #[test]
    fn logging_errors_display() {
        assert_eq!(
            LoggingError::UnknownFormat("xml".to_string()).to_string(),
            "Unknown log format: xml"
        );
        assert_eq!(
            LoggingError::AlreadyInitialized.to_string(),
            "Global logging subscriber already set"
        );
    }
}
