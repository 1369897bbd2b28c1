//! Logging setup for the Galaxis engine.
//!
//! Built on the `tracing` ecosystem. Supports a minimal stderr subscriber for
//! tests and early startup, and a configurable initialization that adds an
//! optional file layer in text or JSON format.

use std::fs;
use std::path::Path;

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;
use crate::error::LoggingError;

/// Initializes a minimal logging setup directed at `stderr`.
///
/// Intended for tests and early startup before the configuration is loaded.
/// Filters by `RUST_LOG`, defaulting to `info`. Errors from double
/// initialization are ignored.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Initializes logging from the engine configuration.
///
/// Installs a console layer filtered by the configured level (overridable via
/// `RUST_LOG`) and, when a log file is configured, a file layer in the
/// configured format.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = fmt::layer().with_writer(std::io::stderr).boxed();

    let mut layers = vec![console_layer];
    if let Some(path) = &config.file {
        layers.push(create_file_layer(path, &config.format)?);
    }

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}

/// Creates a file logging layer, ensuring the parent directory exists.
fn create_file_layer(
    log_path: &Path,
    format: &str,
) -> Result<Box<dyn Layer<Registry> + Send + Sync + 'static>, LoggingError> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(LoggingError::DirectoryCreation)?;
        }
    }

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(LoggingError::DirectoryCreation)?;

    let layer = match format {
        "json" => fmt::layer().json().with_ansi(false).with_writer(file).boxed(),
        "text" => fmt::layer().with_ansi(false).with_writer(file).boxed(),
        other => return Err(LoggingError::UnknownFormat(other.to_string())),
    };

    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;

    #[test]
    fn unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");
        let result = create_file_layer(&path, "xml");
        assert!(matches!(result, Err(LoggingError::UnknownFormat(_))));
    }

    #[test]
    fn file_layer_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("engine.log");
        create_file_layer(&path, "text").unwrap();
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn init_from_config_smoke() {
        // May fail with AlreadyInitialized when another test won the race;
        // both outcomes are acceptable here.
        let config = LoggingConfig::default();
        match init_logging(&config) {
            Ok(()) | Err(LoggingError::AlreadyInitialized) => {}
            Err(other) => panic!("unexpected logging error: {other}"),
        }
    }
}
