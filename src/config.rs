//! # Configuration Management
//!
//! Structured configuration for the gateway: connection deadlines, abuse
//! limits, listener settings, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults plus `default_with_overrides()`
//!
//! Defaults follow the protocol's established operational values: 30 second
//! read/write deadlines and a 250 packets-per-second cap.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main configuration structure containing all configurable settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GatewayConfig {
    /// Connection and listener configuration
    #[serde(default)]
    pub network: NetworkSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| GatewayError::Config(format!("failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("GATEWAY_BIND_ADDRESS") {
            config.network.bind_address = addr;
        }

        if let Ok(timeout) = std::env::var("GATEWAY_READ_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.network.read_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("GATEWAY_WRITE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.network.write_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(cap) = std::env::var("GATEWAY_MAX_PACKETS_PER_SECOND") {
            if let Ok(val) = cap.parse::<u32>() {
                config.network.max_packets_per_second = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# failed to generate example config"))
    }

    /// Validate the configuration.
    ///
    /// Returns a list of validation errors; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.network.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Config(format!(
                "configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Connection and listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkSettings {
    /// Listen address (e.g., "127.0.0.1:7171")
    pub bind_address: String,

    /// Deadline for each inbound read (header or body)
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Deadline for each outbound write
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,

    /// Per-connection inbound packet rate cap
    pub max_packets_per_second: u32,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            bind_address: String::from("127.0.0.1:7171"),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            max_packets_per_second: 250,
            shutdown_timeout: Duration::from_secs(10),
            max_connections: 1000,
        }
    }
}

impl NetworkSettings {
    /// Validate network settings
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("bind address cannot be empty".to_string());
        } else if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "invalid bind address format: '{}' (expected format: '0.0.0.0:7171')",
                self.bind_address
            ));
        }

        if self.read_timeout.as_millis() < 100 {
            errors.push("read timeout too short (minimum: 100ms)".to_string());
        } else if self.read_timeout.as_secs() > 300 {
            errors.push("read timeout too long (maximum: 300s)".to_string());
        }

        if self.write_timeout.as_millis() < 100 {
            errors.push("write timeout too short (minimum: 100ms)".to_string());
        } else if self.write_timeout.as_secs() > 300 {
            errors.push("write timeout too long (maximum: 300s)".to_string());
        }

        if self.max_packets_per_second == 0 {
            errors.push("packet rate cap must be greater than 0".to_string());
        } else if self.max_packets_per_second > 100_000 {
            errors.push(format!(
                "packet rate cap very high: {} (ensure this is intentional)",
                self.max_packets_per_second
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("max connections must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("gateway-protocol"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization as milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("invalid log level: {level_str}")))
    }
}
