//! Binder configuration
//!
//! Sources, highest priority first:
//! 1. Environment variables (`MATBIND_*`)
//! 2. Configuration file (`MATBIND_CONFIG`, or `.matbind.toml` etc. in the
//!    current directory)
//! 3. Built-in defaults

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use matbind_logging::LoggingOptions;

use crate::types::ElementType;

/// Library loaded when neither a path nor a name is configured.
pub const DEFAULT_LIBRARY_NAME: &str = "vital_c";

/// Top-level binder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinderConfig {
    /// Native library location
    #[serde(default)]
    pub library: LibraryConfig,
    /// Defaults applied to view requests
    #[serde(default)]
    pub views: ViewsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Explicit path to the shared library; wins over `name`
    pub path: Option<PathBuf>,
    /// Base name, expanded to the platform file name
    #[serde(default = "default_library_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewsConfig {
    /// Element type used when a request names none
    #[serde(default = "default_dtype")]
    pub default_dtype: ElementType,
    /// Ownership assumed for wrapped handles when a request leaves it unset
    #[serde(default)]
    pub default_owns_wrapped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn default_library_name() -> String {
    DEFAULT_LIBRARY_NAME.to_string()
}

fn default_dtype() -> ElementType {
    ElementType::F64
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            path: None,
            name: default_library_name(),
        }
    }
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            default_dtype: default_dtype(),
            default_owns_wrapped: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl LoggingConfig {
    pub fn to_options(&self) -> LoggingOptions {
        LoggingOptions {
            default_filter: self.level.as_str().to_string(),
        }
    }
}

/// On-disk configuration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Format implied by a file extension; `None` when it names none.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str())? {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    fn parse(self, content: &str) -> Result<BinderConfig> {
        Ok(match self {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        })
    }

    fn render(self, config: &BinderConfig) -> Result<String> {
        Ok(match self {
            ConfigFormat::Toml => toml::to_string_pretty(config)?,
            ConfigFormat::Yaml => serde_yaml::to_string(config)?,
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        })
    }

    fn name(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Configuration loader with multiple source support
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<BinderConfig> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                BinderConfig::default()
            }
        };
        Self::apply_environment_variables(&mut config)?;
        Ok(config)
    }

    /// `MATBIND_CONFIG` if set, else the first `.matbind.*` file in the
    /// current directory.
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(explicit) = env::var("MATBIND_CONFIG") {
            return Some(PathBuf::from(explicit));
        }
        let cwd = env::current_dir().ok()?;
        [".matbind.toml", ".matbind.yaml", ".matbind.yml", ".matbind.json"]
            .into_iter()
            .map(|name| cwd.join(name))
            .find(|path| path.is_file())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<BinderConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if let Some(format) = ConfigFormat::from_path(path) {
            return format.parse(&content).with_context(|| {
                format!("Failed to parse {} config: {}", format.name(), path.display())
            });
        }

        // unknown extension: first format that parses wins
        [ConfigFormat::Toml, ConfigFormat::Yaml, ConfigFormat::Json]
            .into_iter()
            .find_map(|format| format.parse(&content).ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Could not parse config file {} (tried TOML, YAML, JSON)",
                    path.display()
                )
            })
    }

    fn apply_environment_variables(config: &mut BinderConfig) -> Result<()> {
        if let Ok(path) = env::var("MATBIND_LIBRARY_PATH") {
            config.library.path = (!path.is_empty()).then(|| PathBuf::from(path));
        }

        if let Some(name) = env::var("MATBIND_LIBRARY_NAME").ok().filter(|n| !n.is_empty()) {
            config.library.name = name;
        }

        if let Ok(dtype) = env::var("MATBIND_DEFAULT_DTYPE") {
            config.views.default_dtype = dtype
                .parse::<ElementType>()
                .with_context(|| format!("Invalid MATBIND_DEFAULT_DTYPE '{dtype}'"))?;
        }

        if let Some(flag) = env::var("MATBIND_OWNS_WRAPPED")
            .ok()
            .and_then(|v| parse_bool(&v))
        {
            config.views.default_owns_wrapped = flag;
        }

        if let Some(level) = env::var("MATBIND_LOG_LEVEL")
            .ok()
            .and_then(|v| parse_log_level(&v))
        {
            config.logging.level = level;
        }

        Ok(())
    }

    /// Save configuration to a file; TOML unless the extension says otherwise.
    pub fn save_to_file(config: &BinderConfig, path: &Path) -> Result<()> {
        let format = ConfigFormat::from_path(path).unwrap_or(ConfigFormat::Toml);
        let content = format
            .render(config)
            .with_context(|| format!("Failed to serialize config to {}", format.name()))?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }
}

/// Parse a boolean value from string with various formats
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enable" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disable" | "disabled" => Some(false),
        "" => Some(false),
        _ => None,
    }
}

fn parse_log_level(value: &str) -> Option<LogLevel> {
    match value.trim().to_ascii_lowercase().as_str() {
        "error" => Some(LogLevel::Error),
        "warn" | "warning" => Some(LogLevel::Warn),
        "info" => Some(LogLevel::Info),
        "debug" => Some(LogLevel::Debug),
        "trace" => Some(LogLevel::Trace),
        _ => None,
    }
}
