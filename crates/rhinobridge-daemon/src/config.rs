//! Configuration loading and validation

use anyhow::Result;
use rhinobridge_core::UnitSystem;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::listener::ListenerOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub document: DocumentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Maximum time to receive one payload, in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Largest payload accepted from the exporter
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout(),
            max_payload_bytes: default_max_payload(),
        }
    }
}

fn default_read_timeout() -> u64 {
    5000
}

fn default_max_payload() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Idle tick interval in milliseconds (one asset is imported per tick)
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick(),
        }
    }
}

fn default_tick() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Path to the persisted plugin settings
    #[serde(default = "default_settings_path")]
    pub path: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

fn default_settings_path() -> String {
    "./rhinobridge-settings.toml".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Model units of the headless document
    #[serde(default)]
    pub units: UnitSystem,
    /// Where to dump the document as JSON on shutdown
    #[serde(default)]
    pub output: Option<String>,
}

impl Config {
    /// Convert to ListenerOptions
    pub fn to_listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            read_timeout: Duration::from_millis(self.listener.read_timeout_ms),
            max_payload_bytes: self.listener.max_payload_bytes,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.idle.tick_ms == 0 {
            anyhow::bail!("idle.tick_ms must be greater than zero");
        }
        if self.listener.read_timeout_ms == 0 {
            anyhow::bail!("listener.read_timeout_ms must be greater than zero");
        }
        if self.listener.max_payload_bytes == 0 {
            anyhow::bail!("listener.max_payload_bytes must be greater than zero");
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        document: DocumentConfig {
            units: UnitSystem::Meters,
            output: Some("./rhinobridge-scene.json".to_string()),
        },
        ..Config::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
