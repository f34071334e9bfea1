//! Prometheus metrics.
//!
//! Stages record through the `metrics` facade; this module installs the
//! Prometheus exporter behind it.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `mnemosyne_revisions_created_total` | Counter | - |
//! | `mnemosyne_manifest_lookups_total` | Counter | `outcome` |
//! | `mnemosyne_encrypted_requests_total` | Counter | `method` |
//! | `mnemosyne_subrequests_total` | Counter | `source`, `method` |

use std::net::SocketAddr;

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether the exporter is installed.
    pub enabled: bool,

    /// Address the scrape endpoint listens on.
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Parses the listen address.
    pub fn socket_addr(&self) -> TelemetryResult<SocketAddr> {
        self.addr
            .parse()
            .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", self.addr)))
    }
}

/// Installs the Prometheus exporter and its scrape listener.
///
/// The listener runs on the ambient Tokio runtime when there is one.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = config.socket_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    describe_metrics();
    tracing::info!(metrics.addr = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Registers descriptions for the gateway's metrics.
pub fn describe_metrics() {
    describe_counter!(
        "mnemosyne_revisions_created_total",
        "Revision objects written for versioned objects"
    );
    describe_counter!(
        "mnemosyne_manifest_lookups_total",
        "Manifest reads by outcome (found, missing, error)"
    );
    describe_counter!(
        "mnemosyne_encrypted_requests_total",
        "Object bodies passed through the cipher, by method"
    );
    describe_counter!(
        "mnemosyne_subrequests_total",
        "Sub-requests issued by interception stages"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = MetricsConfig {
            enabled: true,
            addr: "127.0.0.1:9191".to_string(),
        };
        assert_eq!(config.socket_addr().unwrap().port(), 9191);
    }

    #[test]
    fn test_invalid_address_is_rejected_before_install() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
