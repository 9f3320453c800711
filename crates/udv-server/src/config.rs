//! Configuration system for the UDV server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (listen address, models path, logging)
//! 2. .env file - loaded into the environment before this module reads it
//!
//! Environment variables always override config.yaml values. A missing
//! config.yaml is not an error; defaults apply.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar { var: String, value: String },
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Where the models document lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub models_path: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            models_path: "configs/models.json".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub schema: SchemaConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_yaml(&contents)?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document parses as null
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("UDV_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("UDV_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvVar {
                var: "UDV_SERVER_PORT".to_string(),
                value: port,
            })?;
        }

        if let Ok(path) = std::env::var("CONFIG_PATH") {
            self.schema.models_path = path;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }

        Ok(())
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
