//! Test error types.

use thiserror::Error;

/// Errors that can occur during testing.
#[derive(Debug, Error)]
pub enum TestError {
    /// Request building failed
    #[error("Request build error: {0}")]
    RequestBuild(String),

    /// Response body reading failed
    #[error("Body read error: {0}")]
    BodyRead(String),

    /// JSON deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Header name or value is invalid
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl From<http::Error> for TestError {
    fn from(e: http::Error) -> Self {
        Self::RequestBuild(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            TestError::BodyRead("eof".into()).to_string(),
            "Body read error: eof"
        );
        assert_eq!(
            TestError::InvalidHeader("x y".into()).to_string(),
            "Invalid header: x y"
        );
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TestError = err.into();
        assert!(matches!(err, TestError::Json(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
