//! The top-level [`DocgateConfig`].

use std::collections::BTreeMap;
use std::net::SocketAddr;

use docgate_core::plugin::PluginSettings;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, DataConfig, LogFormat, LoggingConfig, PluginConfig, ServerConfig};

/// Complete Docgate configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use docgate_config::DocgateConfig;
///
/// let config = DocgateConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.plugins.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DocgateConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-plugin settings, keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,

    /// Document service defaults.
    #[serde(default)]
    pub data: DataConfig,
}

impl DocgateConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - the server address is not a socket address
    /// - the log level is not a valid filter directive
    /// - a plugin `uri` does not start with `/`
    /// - the default page size exceeds the maximum
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if let Err(err) = docgate_telemetry::create_env_filter(&self.logging.level) {
            return Err(ConfigError::invalid_value("logging.level", err.to_string()));
        }

        for (name, plugin) in &self.plugins {
            if let Some(uri) = &plugin.uri {
                if !uri.starts_with('/') {
                    return Err(ConfigError::invalid_value(
                        format!("plugins.{name}.uri"),
                        format!("'{uri}' must start with '/'"),
                    ));
                }
            }
            if !(plugin.args.is_null() || plugin.args.is_object()) {
                return Err(ConfigError::invalid_value(
                    format!("plugins.{name}.args"),
                    "must be a table",
                ));
            }
        }

        if self.data.default_pagesize > self.data.max_pagesize {
            return Err(ConfigError::invalid_value(
                "data.default_pagesize",
                format!("exceeds data.max_pagesize ({})", self.data.max_pagesize),
            ));
        }

        Ok(())
    }

    /// Development preset: debug level, pretty logs, loopback address.
    #[must_use]
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                http_addr: "127.0.0.1:8080".to_string(),
                shutdown_timeout_secs: 5,
                ..ServerConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                ..LoggingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the registry settings of every configured plugin.
    pub fn plugin_settings(&self) -> impl Iterator<Item = (&str, PluginSettings)> + '_ {
        self.plugins
            .iter()
            .map(|(name, plugin)| (name.as_str(), plugin.to_settings()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_valid() {
        DocgateConfig::default().validate().unwrap();
        DocgateConfig::development().validate().unwrap();
    }

    #[test]
    fn test_invalid_address() {
        let mut config = DocgateConfig::default();
        config.server.http_addr = "localhost".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.http_addr"));
    }

    #[test]
    fn test_relative_plugin_uri_rejected() {
        let mut config = DocgateConfig::default();
        config.plugins.insert(
            "graphql".to_string(),
            PluginConfig {
                uri: Some("gql".to_string()),
                ..PluginConfig::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("plugins.graphql.uri"));
    }

    #[test]
    fn test_scalar_plugin_args_rejected() {
        let mut config = DocgateConfig::default();
        config.plugins.insert(
            "snooper".to_string(),
            PluginConfig {
                args: json!(3),
                ..PluginConfig::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_sizes_checked() {
        let mut config = DocgateConfig::default();
        config.data.default_pagesize = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plugin_settings() {
        let mut config = DocgateConfig::default();
        config.plugins.insert(
            "documents".to_string(),
            PluginConfig {
                uri: Some("/api".to_string()),
                ..PluginConfig::default()
            },
        );
        let settings: Vec<_> = config.plugin_settings().collect();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].0, "documents");
        assert_eq!(settings[0].1.uri.as_deref(), Some("/api"));
    }
}
