//! Engine configuration.
//!
//! The host application loads an `EngineConfig` from a TOML file (or falls
//! back to the defaults) and hands the relevant sections to the rendering and
//! UI layers: window geometry and vsync to the device core, the assets root
//! to the loaders, and the logging section to [`crate::logging`].

mod loader;
mod types;

pub use loader::{load_config, load_config_from_str};
pub use types::{AssetsConfig, EngineConfig, LoggingConfig, WindowConfig};
