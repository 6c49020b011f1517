//! Configuration and settings management for Skinnydip
//!
//! Supports JSON and TOML files. The default file lives in the platform
//! configuration directory (`~/.config/skinnydip/config.toml` on Linux);
//! when it does not exist the defaults apply.
//!
//! Configuration is organized into two sections:
//! - Engine tuning (auto insertion distance offset)
//! - Output handling (backups, log file, file name suffixes)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skinnydip_core::EngineOptions;

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// Directory name under the platform config directory
pub const APP_DIR_NAME: &str = "skinnydip";
/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Accepted range for the auto distance tuning offset (mm)
pub const TUNING_OFFSET_LIMIT: f64 = 10.0;

/// What to do with the files around a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Keep the unprocessed input next to the result
    pub keep_original: bool,
    /// Write the run log next to the input
    pub write_log: bool,
    /// Name of the log file
    pub log_file_name: String,
    /// Suffix of the temporary output file stem
    pub output_suffix: String,
    /// Suffix of the kept original's file stem
    pub backup_suffix: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            keep_original: false,
            write_log: true,
            log_file_name: "skinnydip.log".to_string(),
            output_suffix: "_skinnydip".to_string(),
            backup_suffix: "_original".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Engine tuning
    pub engine: EngineOptions,
    /// Output handling
    pub output: OutputSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("none").to_string()).into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            SettingsError::ConfigDirectory("platform has no configuration directory".to_string())
        })?;
        Ok(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Load `path` when given, else the default file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match Self::default_path() {
            Ok(default) if default.exists() => Self::load_from_file(&default),
            Ok(_) => Ok(Self::default()),
            Err(e) => {
                tracing::debug!("Using default settings: {}", e);
                Ok(Self::default())
            }
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content).map_err(|e| SettingsError::SaveError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let offset = self.engine.tuning_offset;
        if !offset.is_finite() || offset.abs() > TUNING_OFFSET_LIMIT {
            return Err(ConfigError::ValueOutOfRange {
                key: "engine.tuning_offset".to_string(),
                value: offset.to_string(),
            });
        }

        let names = [
            ("output.log_file_name", &self.output.log_file_name),
            ("output.output_suffix", &self.output.output_suffix),
            ("output.backup_suffix", &self.output.backup_suffix),
        ];
        for (key, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyValue(key.to_string()));
            }
            if value.contains(['/', '\\']) {
                return Err(ConfigError::NotAFileName {
                    key: key.to_string(),
                    value: value.clone(),
                });
            }
        }

        if self.output.output_suffix == self.output.backup_suffix {
            return Err(ConfigError::ValueOutOfRange {
                key: "output.backup_suffix".to_string(),
                value: format!("'{}' (same as output_suffix)", self.output.backup_suffix),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.tuning_offset, -1.5);
        assert!(!config.output.keep_original);
        assert!(config.output.write_log);
        assert_eq!(config.output.log_file_name, "skinnydip.log");
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::new();
        config.engine.tuning_offset = -2.0;
        config.output.keep_original = true;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "output": { "keep_original": true } }"#).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert!(loaded.output.keep_original);
        assert_eq!(loaded.output.backup_suffix, "_original");
        assert_eq!(loaded.engine.tuning_offset, -1.5);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::new()
            .save_to_file(Path::new("config.yaml"))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Config(ConfigError::UnsupportedFormat(ref ext)) if ext == "yaml"
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::new();
        config.engine.tuning_offset = 25.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValueOutOfRange { .. })
        ));

        let mut config = Config::new();
        config.output.log_file_name = "  ".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyValue("output.log_file_name".to_string()))
        );

        let mut config = Config::new();
        config.output.backup_suffix = "../x".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotAFileName { .. })
        ));
    }

    #[test]
    fn test_invalid_file_is_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\ntuning_offset = 40.0\n").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(SettingsError::Config(_))
        ));
    }

    #[test]
    fn test_load_or_default_with_explicit_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load_or_default(Some(&missing)),
            Err(SettingsError::LoadError { .. })
        ));
    }
}
