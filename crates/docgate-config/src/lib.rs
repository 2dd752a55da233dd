//! Layered configuration for Docgate.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//! max_body_bytes = 16777216
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [data]
//! default_pagesize = 100
//! max_pagesize = 1000
//!
//! [plugins.graphql]
//! enabled = true
//! uri = "/graphql"
//!
//! [plugins.graphql.args]
//! db = "docgate"
//! collection = "gqlapps"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `DOCGATE__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `DOCGATE__LOGGING__LEVEL=debug`
//! - `DOCGATE__PLUGINS__SNOOPER__ENABLED=false`
//! - `DOCGATE__PLUGINS__CHECKCONTENTSIZE__ARGS__MAX=4096`

#![doc(html_root_url = "https://docs.rs/docgate-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::DocgateConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{DataConfig, LogFormat, LoggingConfig, PluginConfig, ServerConfig};
