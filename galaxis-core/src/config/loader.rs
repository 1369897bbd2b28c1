//! TOML configuration loading.

use std::fs;
use std::path::Path;

use crate::config::EngineConfig;
use crate::error::ConfigError;

/// Loads the engine configuration from a TOML file.
///
/// Missing keys fall back to their defaults; a missing file is an error so
/// the host can distinguish "no config" from "broken config" and decide to
/// fall back to `EngineConfig::default()` itself.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(ConfigError::FileRead)?;
    load_config_from_str(&raw)
}

/// Parses the engine configuration from a TOML string.
pub fn load_config_from_str(raw: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(raw)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.window.width == 0 || config.window.height == 0 {
        return Err(ConfigError::InvalidValue {
            key: "window.width/height".to_string(),
            reason: "window extent must be non-zero".to_string(),
        });
    }
    match config.logging.format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: "logging.format".to_string(),
            reason: format!("unknown format '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_apply_for_missing_keys() {
        let config = load_config_from_str("[window]\nwidth = 1920\nheight = 1080\n").unwrap();
        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.vsync, true);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn zero_extent_is_rejected() {
        let err = load_config_from_str("[window]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let err = load_config_from_str("[logging]\nformat = \"yaml\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn round_trips_through_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[window]\nwidth = 800\nheight = 600\nvsync = false\n[assets]\nroot = \"Data\"\n"
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.vsync, false);
        assert_eq!(config.assets.root, std::path::PathBuf::from("Data"));
    }
}
