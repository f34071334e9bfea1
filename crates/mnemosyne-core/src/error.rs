//! Error types for Mnemosyne.
//!
//! [`GatewayError`] is the error taxonomy shared by the interception layers.
//! Every variant maps to exactly one externally visible HTTP status:
//!
//! | Variant | Status |
//! |---|---|
//! | `Configuration` | 500 (raised at construction only) |
//! | `KeyFormat` | 500 |
//! | `PreconditionFailed` | 412 |
//! | `ServiceUnavailable` | 503 |
//! | `Transport` | 502 |
//! | `Upstream` | the backing-store status, verbatim |
//! | `RangeNotSatisfiable` | 416 |
//! | `Internal` | 500 |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::KeyFormatError;

/// Result type alias using [`GatewayError`].
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Categories of errors for classification and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Unresolvable process-wide configuration.
    Configuration,
    /// Malformed key material from the key-management collaborator.
    KeyFormat,
    /// The object is missing state the protocol requires.
    Precondition,
    /// A required per-request collaborator is not configured.
    Unavailable,
    /// The backing store could not be reached.
    Transport,
    /// The backing store answered with an error status.
    Upstream,
    /// The requested byte range cannot be served.
    Range,
    /// Any other internal failure.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Configuration | Self::KeyFormat | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Precondition => StatusCode::PRECONDITION_FAILED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport | Self::Upstream => StatusCode::BAD_GATEWAY,
            Self::Range => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    /// Returns the category name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::KeyFormat => "key_format",
            Self::Precondition => "precondition",
            Self::Unavailable => "unavailable",
            Self::Transport => "transport",
            Self::Upstream => "upstream",
            Self::Range => "range",
            Self::Internal => "internal",
        }
    }
}

/// Standard error type for the interception layers.
///
/// # Example
///
/// ```
/// use mnemosyne_core::GatewayError;
/// use http::StatusCode;
///
/// let err = GatewayError::precondition_failed("manifest has no revision pointer");
/// assert_eq!(err.status_code(), StatusCode::PRECONDITION_FAILED);
/// ```
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration could not be resolved. Fatal at startup.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// Key material had the wrong shape.
    #[error("Key format error: {0}")]
    KeyFormat(#[from] KeyFormatError),

    /// The request cannot be served because required object state is missing.
    #[error("Precondition failed: {message}")]
    PreconditionFailed {
        /// Human-readable error message.
        message: String,
    },

    /// A required collaborator is not configured in the pipeline.
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Human-readable error message.
        message: String,
    },

    /// A sub-request could not reach the backing store.
    #[error("Transport error: {message}")]
    Transport {
        /// Human-readable error message.
        message: String,
    },

    /// The backing store returned a non-success status that is propagated.
    #[error("Upstream returned {status}")]
    Upstream {
        /// The status returned by the backing store.
        status: StatusCode,
    },

    /// The requested range cannot be served.
    #[error("Range not satisfiable: {message}")]
    RangeNotSatisfiable {
        /// Human-readable error message.
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl GatewayError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a precondition-failed error.
    #[must_use]
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }

    /// Creates a service-unavailable error.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an error that propagates a backing-store status.
    #[must_use]
    pub const fn upstream(status: StatusCode) -> Self {
        Self::Upstream { status }
    }

    /// Creates a range-not-satisfiable error.
    #[must_use]
    pub fn range_not_satisfiable(message: impl Into<String>) -> Self {
        Self::RangeNotSatisfiable {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::KeyFormat(_) => ErrorCategory::KeyFormat,
            Self::PreconditionFailed { .. } => ErrorCategory::Precondition,
            Self::ServiceUnavailable { .. } => ErrorCategory::Unavailable,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Upstream { .. } => ErrorCategory::Upstream,
            Self::RangeNotSatisfiable { .. } => ErrorCategory::Range,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream { status } => *status,
            other => other.category().default_status_code(),
        }
    }

    /// Returns the text sent to the client.
    ///
    /// Upstream errors carry no message of their own, so the canonical
    /// reason phrase is used.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Upstream { status } => status
                .canonical_reason()
                .unwrap_or("Upstream Error")
                .to_string(),
            Self::Configuration { message }
            | Self::PreconditionFailed { message }
            | Self::ServiceUnavailable { message }
            | Self::Transport { message }
            | Self::RangeNotSatisfiable { message }
            | Self::Internal { message } => message.clone(),
            Self::KeyFormat(_) => "Unable to resolve encryption key".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_failed() {
        let error = GatewayError::precondition_failed("no pointer");
        assert_eq!(error.category(), ErrorCategory::Precondition);
        assert_eq!(error.status_code(), StatusCode::PRECONDITION_FAILED);
        assert!(error.to_string().contains("no pointer"));
    }

    #[test]
    fn test_upstream_status_is_verbatim() {
        let error = GatewayError::upstream(StatusCode::UNAUTHORIZED);
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(error.client_message(), "Unauthorized");

        let error = GatewayError::upstream(StatusCode::FORBIDDEN);
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_service_unavailable() {
        let error = GatewayError::service_unavailable("improperly configured");
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.client_message(), "improperly configured");
    }

    #[test]
    fn test_transport_maps_to_bad_gateway() {
        let error = GatewayError::transport("connection refused");
        assert_eq!(error.category(), ErrorCategory::Transport);
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_key_format_is_internal_and_hides_detail() {
        let error = GatewayError::from(KeyFormatError::InvalidHex);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.client_message().contains("hex"));
    }

    #[test]
    fn test_all_error_categories_have_error_status_codes() {
        let categories = [
            ErrorCategory::Configuration,
            ErrorCategory::KeyFormat,
            ErrorCategory::Precondition,
            ErrorCategory::Unavailable,
            ErrorCategory::Transport,
            ErrorCategory::Upstream,
            ErrorCategory::Range,
            ErrorCategory::Internal,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
        }
    }
}
