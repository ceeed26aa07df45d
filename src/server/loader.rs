//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            File::with_name(&format!(
                "config/{}",
                std::env::var("DECKHAND_ENV").unwrap_or_else(|_| "development".to_string())
            ))
            .required(false),
        )
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority)
        // prefix_separator("_") so DECKHAND_SERVER__PORT works (single _ after prefix)
        .add_source(
            Environment::with_prefix("DECKHAND")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("upload.allowed_extensions")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;
    config.validate()?;
    Ok(config)
}
