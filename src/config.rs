use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::{resolve_clone_root, APP_DIR};

/// Environment variable overriding `clone_root`
pub const CLONE_ROOT_ENV: &str = "REPODOCK_CLONE_ROOT";
/// Environment variable overriding `allow_ssh`
pub const ALLOW_SSH_ENV: &str = "REPODOCK_ALLOW_SSH";

/// Main configuration structure for repodock
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory under which clones are materialized as host/owner/repo
    #[serde(default = "default_clone_root")]
    pub clone_root: String,

    /// Accept SSH repository references when the caller does not say otherwise
    #[serde(default)]
    pub allow_ssh: bool,

    /// Git subprocess settings
    #[serde(default)]
    pub git: GitConfig,

    /// Invocation telemetry
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Git subprocess configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    /// Git executable
    #[serde(default = "default_git_binary")]
    pub binary: String,

    /// Timeout for each git operation in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// `-c key=value` pairs passed to every git invocation
    #[serde(default)]
    pub config_overrides: BTreeMap<String, String>,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Event log location (defaults to the XDG data directory)
    pub path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_clone_root() -> String {
    format!("~/{}/repos", APP_DIR)
}
fn default_git_binary() -> String {
    "git".to_string()
}
fn default_timeout() -> u64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            timeout: default_timeout(),
            config_overrides: BTreeMap::new(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clone_root: default_clone_root(),
            allow_ssh: false,
            git: GitConfig::default(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            config
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repodock").join("config.yml"))
    }

    /// Apply `REPODOCK_*` environment overrides
    ///
    /// Only called while loading; the engine receives plain values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var(CLONE_ROOT_ENV) {
            if !root.trim().is_empty() {
                self.clone_root = root;
            }
        }

        if let Ok(value) = std::env::var(ALLOW_SSH_ENV) {
            self.allow_ssh = parse_bool_flag(&value)
                .with_context(|| format!("Invalid {} value: {:?}", ALLOW_SSH_ENV, value))?;
        }

        Ok(())
    }

    /// Expanded, absolute clone root
    pub fn clone_root_path(&self) -> Result<PathBuf> {
        resolve_clone_root(&self.clone_root)
            .with_context(|| format!("Invalid clone_root: {}", self.clone_root))
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git.timeout)
    }

    /// Telemetry file, or `None` when telemetry is disabled
    pub fn telemetry_path(&self) -> Result<Option<PathBuf>> {
        if !self.telemetry.enabled {
            return Ok(None);
        }

        match &self.telemetry.path {
            Some(path) => {
                let expanded = shellexpand::full(path)
                    .context("Failed to expand telemetry path")?
                    .into_owned();
                Ok(Some(PathBuf::from(expanded)))
            }
            None => crate::telemetry::JsonlTelemetry::default_path().map(Some),
        }
    }
}

fn parse_bool_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}
