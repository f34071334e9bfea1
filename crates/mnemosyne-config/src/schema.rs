//! Configuration schema types.
//!
//! This module defines the structure of every configuration section.

use mnemosyne_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

/// Backing object store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the store (e.g. `http://127.0.0.1:8080`).
    #[serde(default = "default_backend_url")]
    pub url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
        }
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

/// At-rest encryption stage.
///
/// # Example
///
/// ```
/// use mnemosyne_config::EncryptionConfig;
///
/// let config = EncryptionConfig {
///     enabled: true,
///     algorithm: "chacha20".to_string(),
///     mode: "stream".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Install the stage.
    #[serde(default)]
    pub enabled: bool,

    /// Cipher algorithm (`aes-128`, `aes-192`, `aes-256`, `chacha20`).
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Cipher mode (`ctr` for AES, `stream` for ChaCha20).
    #[serde(default = "default_mode")]
    pub mode: String,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: default_algorithm(),
            mode: default_mode(),
        }
    }
}

fn default_algorithm() -> String {
    "aes-256".to_string()
}

fn default_mode() -> String {
    "ctr".to_string()
}

/// Fixed-key key management stage.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeyManagementConfig {
    /// Install the stage.
    #[serde(default)]
    pub enabled: bool,

    /// Key material as `<hex key>` or `<hex key>:<hex iv>`.
    #[serde(default)]
    pub key: Option<String>,
}

impl std::fmt::Debug for KeyManagementConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManagementConfig")
            .field("enabled", &self.enabled)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Object versioning stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RevisionsConfig {
    /// Install the stage.
    #[serde(default)]
    pub enabled: bool,
}

/// Capability discovery endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InfoConfig {
    /// Install the stage.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path answered with the capability document.
    #[serde(default = "default_info_path")]
    pub path: String,
}

impl Default for InfoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_info_path(),
        }
    }
}

fn default_info_path() -> String {
    "/info".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Install the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Scrape endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Telemetry section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics.
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingConfig::default(),
            metrics: MetricsSection::default(),
        }
    }
}

impl TelemetrySection {
    /// Converts the section into the telemetry crate's configuration.
    #[must_use]
    pub fn to_telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.service_name.clone(),
            logging: LogConfig {
                enabled: self.logging.enabled,
                level: self.logging.level.clone(),
                format: self.logging.format,
                include_location: self.logging.include_location,
            },
            metrics: MetricsConfig {
                enabled: self.metrics.enabled,
                addr: self.metrics.addr.clone(),
            },
        }
    }
}

fn default_service_name() -> String {
    "mnemosyne".to_string()
}

fn default_true() -> bool {
    true
}
