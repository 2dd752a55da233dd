//! Error types for Docgate.
//!
//! [`GateError`] is the single error type flowing through plugins, stages and
//! the data layer. Every variant maps to an [`ErrorCategory`] and an HTTP status
//! so the pipeline can turn any failure into an error response.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`GateError`].
pub type GateResult<T> = Result<T, GateError>;

/// Error categories for classification and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid plugin or service configuration. Fatal at startup.
    Configuration,
    /// A plugin or resource does not exist.
    NotFound,
    /// A write was attempted with a missing or stale version token.
    VersionConflict,
    /// A write violated a uniqueness constraint.
    DuplicateKey,
    /// A plugin failed while running.
    PluginExecution,
    /// The request content is not acceptable.
    MalformedInput,
    /// The caller could not be authenticated.
    Unauthorized,
    /// The caller is not allowed to perform the request.
    Forbidden,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::VersionConflict => StatusCode::CONFLICT,
            Self::DuplicateKey => StatusCode::EXPECTATION_FAILED,
            Self::MalformedInput => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Configuration | Self::PluginExecution | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the category name used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::NotFound => "not_found",
            Self::VersionConflict => "version_conflict",
            Self::DuplicateKey => "duplicate_key",
            Self::PluginExecution => "plugin_execution",
            Self::MalformedInput => "malformed_input",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Internal => "internal",
        }
    }
}

/// The standard error type for Docgate.
#[derive(Error, Debug)]
pub enum GateError {
    /// Invalid configuration, such as an unknown plugin name or overlapping mounts.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// The named plugin or resource does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Missing or stale version token on a write.
    #[error("Version conflict: {message}")]
    VersionConflict {
        /// Human-readable error message.
        message: String,
    },

    /// Uniqueness constraint violated.
    #[error("Duplicate key: {message}")]
    DuplicateKey {
        /// Human-readable error message.
        message: String,
    },

    /// A plugin failed while running.
    #[error("Error executing plugin '{plugin}': {message}")]
    PluginExecution {
        /// Name of the failing plugin.
        plugin: String,
        /// Human-readable error message.
        message: String,
    },

    /// Request content is not acceptable.
    #[error("{message}")]
    MalformedInput {
        /// Human-readable error message.
        message: String,
        /// Status to respond with, 400 or 406.
        status: StatusCode,
    },

    /// Authentication failed.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Human-readable error message.
        message: String,
    },

    /// The caller is not allowed to perform the request.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// Internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl GateError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a version conflict error.
    pub fn version_conflict(message: impl Into<String>) -> Self {
        Self::VersionConflict {
            message: message.into(),
        }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self::DuplicateKey {
            message: message.into(),
        }
    }

    /// Creates a plugin execution error for the named plugin.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginExecution {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed input error answered with 400.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    /// Creates a malformed input error answered with 406.
    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
            status: StatusCode::NOT_ACCEPTABLE,
        }
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error wrapping a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::VersionConflict { .. } => ErrorCategory::VersionConflict,
            Self::DuplicateKey { .. } => ErrorCategory::DuplicateKey,
            Self::PluginExecution { .. } => ErrorCategory::PluginExecution,
            Self::MalformedInput { .. } => ErrorCategory::MalformedInput,
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::Forbidden { .. } => ErrorCategory::Forbidden,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code to respond with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedInput { status, .. } => *status,
            _ => self.category().default_status_code(),
        }
    }

    /// Returns the message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration { message }
            | Self::NotFound { message }
            | Self::VersionConflict { message }
            | Self::DuplicateKey { message }
            | Self::PluginExecution { message, .. }
            | Self::MalformedInput { message, .. }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("invalid json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_maps_to_expectation_failed() {
        let error = GateError::duplicate_key("E11000 duplicate key error");
        assert_eq!(error.category(), ErrorCategory::DuplicateKey);
        assert_eq!(error.status_code(), StatusCode::EXPECTATION_FAILED);
    }

    #[test]
    fn test_malformed_input_keeps_status() {
        let error = GateError::not_acceptable("data must be a json object");
        assert_eq!(error.status_code(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(error.to_string(), "data must be a json object");

        let error = GateError::bad_request("invalid query");
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_plugin_error_names_plugin() {
        let error = GateError::plugin("snooper", "boom");
        assert_eq!(error.to_string(), "Error executing plugin 'snooper': boom");
        assert_eq!(error.message(), "boom");
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let error = GateError::internal_with_source("write failed", io);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_all_error_categories_have_status_codes() {
        let categories = [
            ErrorCategory::Configuration,
            ErrorCategory::NotFound,
            ErrorCategory::VersionConflict,
            ErrorCategory::DuplicateKey,
            ErrorCategory::PluginExecution,
            ErrorCategory::MalformedInput,
            ErrorCategory::Unauthorized,
            ErrorCategory::Forbidden,
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
