//! Configuration for the nity loader
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard path)
//! - TOML parsing with serde
//! - Environment variable overrides

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// System-wide config file location
pub const SYSTEM_CONFIG_PATH: &str = "/etc/nity/config.toml";

/// Complete loader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Process settings
    pub loader: LoaderSettings,

    /// Attach target and pinning
    pub attach: AttachSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachSettings {
    /// cgroup v2 directory whose connect4 hook receives the program
    pub cgroup_path: String,

    /// Directory for map pins; empty disables pinning
    pub pin_root: String,
}

impl Default for AttachSettings {
    fn default() -> Self {
        Self {
            cgroup_path: "/sys/fs/cgroup".to_string(),
            pin_root: "/sys/fs/bpf/nity".to_string(),
        }
    }
}

impl AttachSettings {
    pub fn pin_root(&self) -> Option<PathBuf> {
        if self.pin_root.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.pin_root))
        }
    }
}

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. NITY_CONFIG environment variable
    /// 3. /etc/nity/config.toml
    /// 4. Default values
    pub fn load(&self) -> ConfigResult<LoaderConfig> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                LoaderConfig::default()
            }
        };

        Self::apply_env_overrides(&mut config);
        Self::validate(&config)?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("NITY_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("NITY_CONFIG path does not exist: {}", env_path);
        }

        let path = PathBuf::from(SYSTEM_CONFIG_PATH);
        if path.exists() {
            return Some(path);
        }

        None
    }

    fn load_from_file(path: &Path) -> ConfigResult<LoaderConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: LoaderConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(config: &mut LoaderConfig) {
        if let Ok(val) = std::env::var("NITY_LOG_LEVEL") {
            config.loader.log_level = val;
        }
        if let Ok(val) = std::env::var("NITY_CGROUP_PATH") {
            config.attach.cgroup_path = val;
        }
        if let Ok(val) = std::env::var("NITY_PIN_ROOT") {
            config.attach.pin_root = val;
        }
    }

    fn validate(config: &LoaderConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.loader.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.loader.log_level, valid_levels
            )));
        }

        if config.attach.cgroup_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "cgroup_path cannot be empty".to_string(),
            ));
        }

        if let Some(root) = config.attach.pin_root() {
            if root.is_relative() {
                return Err(ConfigError::ValidationError(format!(
                    "pin_root must be absolute: {}",
                    root.display()
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, config: &LoaderConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}
