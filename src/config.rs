//! Configuration management for script-builder.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file (JSON)
//! 3. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Library configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Script file settings.
    pub script: ScriptSection,
    /// Execution settings.
    pub execution: ExecutionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Script file section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSection {
    /// Directory for temporary scripts. `None` means `<cwd>/temp`.
    pub temp_dir: Option<PathBuf>,
    /// Run built scripts privileged.
    pub privileged: bool,
}

impl Default for ScriptSection {
    fn default() -> Self {
        Self {
            temp_dir: None,
            privileged: true,
        }
    }
}

/// Execution section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Seconds to wait for a script before killing it. `None` waits forever.
    pub timeout_secs: Option<u64>,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var("SCRIPT_BUILDER_TEMP_DIR") {
            if !dir.trim().is_empty() {
                self.script.temp_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(value) = var("SCRIPT_BUILDER_PRIVILEGED") {
            self.script.privileged = parse_bool(&value)
                .ok_or(ConfigError::InvalidValue("SCRIPT_BUILDER_PRIVILEGED", value))?;
        }

        if let Some(value) = var("SCRIPT_BUILDER_TIMEOUT_SECS") {
            let secs = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SCRIPT_BUILDER_TIMEOUT_SECS", value))?;
            self.execution.timeout_secs = Some(secs);
        }

        if let Some(level) = var("SCRIPT_BUILDER_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: env vars > config file > defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env()?;

        Ok(config)
    }

    /// Exit timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.execution.timeout_secs.map(Duration::from_secs)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Environment variable with an unusable value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
