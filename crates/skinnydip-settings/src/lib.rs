//! Skinnydip Settings Crate
//!
//! Handles user configuration: engine tuning and output file handling,
//! persisted as TOML or JSON.

pub mod config;
pub mod error;

pub use config::{Config, OutputSettings, APP_DIR_NAME, CONFIG_FILE_NAME};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
