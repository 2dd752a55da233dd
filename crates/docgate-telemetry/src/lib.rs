//! Observability for Docgate.
//!
//! - **Logging**: structured JSON or pretty output through `tracing-subscriber`
//! - **Metrics**: counters and histograms through the `metrics` facade
//!
//! No metrics exporter is installed here; the embedding application chooses one.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `docgate_requests_total` | Counter | `service`, `status` | Completed requests |
//! | `docgate_request_duration_seconds` | Histogram | `service` | Request latency |
//! | `docgate_plugin_failures_total` | Counter | `kind`, `plugin` | Failed plugin invocations |
//! | `docgate_writes_total` | Counter | `op`, `outcome` | Write outcomes |
//!
//! # Example
//!
//! ```rust,ignore
//! use docgate_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(service = "documents", "ready");
//! ```

#![doc(html_root_url = "https://docs.rs/docgate-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
