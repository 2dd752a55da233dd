//! Configuration schema types.
//!
//! Every section rejects unknown fields.

use docgate_core::plugin::PluginSettings;
use docgate_telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server configuration section.
///
/// # Example
///
/// ```
/// use docgate_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:8080".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.shutdown_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g., "info" or "docgate_pipeline=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Converts the section into the telemetry crate's [`LogConfig`].
    pub fn to_log_config(&self) -> LogConfig {
        let base = match self.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            ..base
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings of one plugin, keyed by plugin name under `[plugins]`.
///
/// ```toml
/// [plugins.graphql]
/// enabled = true
/// uri = "/gql"
///
/// [plugins.graphql.args]
/// db = "apps"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Overrides whether the plugin is enabled.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Mount point of a service.
    #[serde(default)]
    pub uri: Option<String>,

    /// Arguments passed to the plugin factory.
    #[serde(default)]
    pub args: Value,
}

impl PluginConfig {
    /// Converts the section into registry settings.
    pub fn to_settings(&self) -> PluginSettings {
        PluginSettings {
            enabled: self.enabled,
            uri: self.uri.clone(),
            args: self.args.clone(),
        }
    }
}

/// Data section: defaults of the document service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Page size used when a request names none.
    #[serde(default = "default_pagesize")]
    pub default_pagesize: usize,

    /// Largest accepted page size.
    #[serde(default = "default_max_pagesize")]
    pub max_pagesize: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            default_pagesize: default_pagesize(),
            max_pagesize: default_max_pagesize(),
        }
    }
}

fn default_pagesize() -> usize {
    100
}

fn default_max_pagesize() -> usize {
    1000
}

fn default_true() -> bool {
    true
}
