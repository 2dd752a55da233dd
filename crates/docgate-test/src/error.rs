//! Test error types.

use thiserror::Error;

/// Errors that can occur while driving a test request.
#[derive(Debug, Error)]
pub enum TestError {
    /// The request could not be built.
    #[error("request build error: {0}")]
    RequestBuild(String),

    /// The response body could not be read.
    #[error("body read error: {0}")]
    BodyRead(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response body is not UTF-8.
    #[error("body is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<http::Error> for TestError {
    fn from(err: http::Error) -> Self {
        Self::RequestBuild(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TestError::RequestBuild("bad uri".to_string());
        assert_eq!(err.to_string(), "request build error: bad uri");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TestError = json_err.into();
        assert!(matches!(err, TestError::Json(_)));
    }
}
