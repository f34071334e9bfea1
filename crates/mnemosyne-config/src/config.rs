//! Top-level configuration.

use http::Uri;
use mnemosyne_core::KeyMaterial;
use serde::{Deserialize, Serialize};

use crate::{
    BackendConfig, ConfigError, EncryptionConfig, InfoConfig, KeyManagementConfig,
    RevisionsConfig, TelemetrySection,
};

/// Complete gateway configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use mnemosyne_config::MnemosyneConfig;
///
/// let config = MnemosyneConfig::default();
/// assert_eq!(config.backend.url, "http://127.0.0.1:8080");
/// assert!(!config.encryption.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct MnemosyneConfig {
    /// Backing store.
    #[serde(default)]
    pub backend: BackendConfig,

    /// At-rest encryption.
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// Key management.
    #[serde(default)]
    pub key_management: KeyManagementConfig,

    /// Object versioning.
    #[serde(default)]
    pub revisions: RevisionsConfig,

    /// Capability discovery.
    #[serde(default)]
    pub info: InfoConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl MnemosyneConfig {
    /// Validates the configuration.
    ///
    /// The cipher pair is only checked for presence here. It is resolved
    /// when the encryption stage is built, and an unsupported pair fails
    /// there.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri: Uri = self.backend.url.parse().map_err(|e| {
            ConfigError::invalid_value("backend.url", format!("{}: {e}", self.backend.url))
        })?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(ConfigError::invalid_value(
                "backend.url",
                format!("expected an absolute http:// URL, got {}", self.backend.url),
            ));
        }

        if self.encryption.enabled {
            if self.encryption.algorithm.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "encryption.algorithm",
                    "must not be empty",
                ));
            }
            if self.encryption.mode.trim().is_empty() {
                return Err(ConfigError::invalid_value("encryption.mode", "must not be empty"));
            }
        }

        if self.key_management.enabled {
            let key = self.key_management.key.as_deref().ok_or_else(|| {
                ConfigError::validation_error(
                    "key_management.key must be set when key management is enabled",
                )
            })?;
            KeyMaterial::parse(key)
                .map_err(|e| ConfigError::invalid_value("key_management.key", e.to_string()))?;
        }

        if self.info.enabled && !self.info.path.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "info.path",
                format!("must start with '/', got {}", self.info.path),
            ));
        }

        mnemosyne_telemetry::logging::create_env_filter(&self.telemetry.logging.level)
            .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;

        if self.telemetry.metrics.enabled
            && self
                .telemetry
                .metrics
                .addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        Ok(())
    }

    /// Development preset: debug-level pretty logs with source locations.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = mnemosyne_telemetry::LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config
    }
}
