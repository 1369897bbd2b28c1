//! Configuration data types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window geometry and presentation options.
    pub window: WindowConfig,
    /// Logging destination and verbosity.
    pub logging: LoggingConfig,
    /// Asset lookup roots.
    pub assets: AssetsConfig,
}

/// Window geometry and presentation options supplied to the device core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial client width in pixels.
    pub width: u32,
    /// Initial client height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
    /// Whether presentation is throttled to the display rate (FIFO).
    pub vsync: bool,
    /// Whether the window starts fullscreen.
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 1280,
            height: 720,
            title: "Von Neumann Probe in Galaxy".to_string(),
            vsync: true,
            fullscreen: false,
        }
    }
}

/// Logging configuration consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level ("trace".."error"), overridable via `RUST_LOG`.
    pub level: String,
    /// Optional log file path; `None` logs to stderr only.
    pub file: Option<PathBuf>,
    /// File layer format: "text" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
            format: "text".to_string(),
        }
    }
}

/// Asset lookup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Root directory all relative asset paths resolve against.
    pub root: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        AssetsConfig {
            root: PathBuf::from("Assets"),
        }
    }
}
