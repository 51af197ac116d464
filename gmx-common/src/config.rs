//! Configuration loading and resolution
//!
//! The configuration file is located following this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `GMX_CONFIG` environment variable
//! 3. User configuration directory (`<config_dir>/gravimix/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A file named explicitly (tiers 1 and 2) must exist and parse. The user
//! directory file is optional; when it is missing the compiled defaults
//! apply.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::params::{DetectionParameters, PlanParameters};
use crate::{Error, Result};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "GMX_CONFIG";

/// Full configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispense planning parameters
    #[serde(default)]
    pub plan: PlanParameters,

    /// Mass-trace segmentation parameters
    #[serde(default)]
    pub detection: DetectionParameters,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    UserDirectory(PathBuf),
    Defaults,
}

impl TomlConfig {
    /// Validate every parameter section
    pub fn validate(&self) -> Result<()> {
        self.plan.validate()?;
        self.detection.validate()?;
        Ok(())
    }
}

/// Resolves and loads the configuration file
pub struct ConfigResolver {
    env_var_name: String,
    user_config: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create a resolver reading `GMX_CONFIG` and the platform config directory
    pub fn new() -> Self {
        Self {
            env_var_name: CONFIG_ENV_VAR.to_string(),
            user_config: default_user_config_path(),
        }
    }

    /// Override the user-directory candidate (tests, portable installs)
    pub fn with_user_config(mut self, path: Option<PathBuf>) -> Self {
        self.user_config = path;
        self
    }

    /// Determine which file (if any) to load
    pub fn locate(&self, cli_arg: Option<&Path>) -> ConfigSource {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return ConfigSource::CommandLine(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return ConfigSource::Environment(PathBuf::from(path));
            }
        }

        // Priority 3: User configuration directory
        if let Some(path) = &self.user_config {
            if path.exists() {
                return ConfigSource::UserDirectory(path.clone());
            }
            debug!("No user config at {}", path.display());
        }

        // Priority 4: Compiled defaults
        ConfigSource::Defaults
    }

    /// Locate, load and validate the configuration
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
        let source = self.locate(cli_arg);
        let config = match &source {
            ConfigSource::CommandLine(path) | ConfigSource::Environment(path) => {
                load_toml_config(path)?
            }
            ConfigSource::UserDirectory(path) => match load_toml_config(path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring unreadable user config {}: {}", path.display(), e);
                    TomlConfig::default()
                }
            },
            ConfigSource::Defaults => {
                info!("No configuration file found, using compiled defaults");
                TomlConfig::default()
            }
        };
        config.validate()?;
        Ok((config, source))
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// `<config_dir>/gravimix/config.toml` for the current platform
pub fn default_user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gravimix").join("config.toml"))
}

/// Read and parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
