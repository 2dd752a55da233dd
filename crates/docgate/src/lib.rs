//! # Docgate
//!
//! **A plugin-driven REST gateway for document databases**
//!
//! Docgate puts an interception pipeline in front of a document store:
//!
//! - **Plugins** – services, interceptors, hooks, transformers, checkers and
//!   security plugins discovered at startup and toggled by configuration
//! - **Interception points** – `BeforeAuth`, `AfterAuth`, `BeforeHandler`,
//!   `Response` and `ResponseAsync`, in deterministic order
//! - **Optimistic concurrency** – every stored resource carries an ETag;
//!   writes honour `If-Match` and a stale token never applies
//! - **Per-resource plugins** – collection metadata declares the hooks,
//!   transformers and checkers that apply to its requests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docgate::{Docgate, DocgateConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gate = Docgate::builder(DocgateConfig::development()).build()?;
//!     gate.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! config ─► StaticDiscovery ─► PluginRegistry ─► initializers ─► seal
//!                                                                  │
//! request ─► Routing ─► Body ─► BeforeAuth ─► Security ─► AfterAuth ─► BeforeHandler
//!                                                                  │
//!    response ◄─ AccessLog ◄─ Response ◄─ Service ◄────────────────┘
//!        │
//!        └──► ResponseAsync (hooks, after the client has its answer)
//! ```

#![doc(html_root_url = "https://docs.rs/docgate/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bootstrap;

pub use bootstrap::{Docgate, DocgateBuilder};

// Re-export the crates
pub use docgate_config as config;
pub use docgate_core as core;
pub use docgate_data as data;
pub use docgate_pipeline as pipeline;
pub use docgate_server as server;
pub use docgate_telemetry as telemetry;

pub use docgate_config::{ConfigLoader, DocgateConfig};
pub use docgate_core::{Container, Exchange, GateError, GateResult};
pub use docgate_pipeline::Pipeline;

/// Prelude for plugin authors.
///
/// ```rust,ignore
/// use docgate::prelude::*;
/// ```
pub mod prelude {
    pub use docgate_core::plugin::{
        Checker, Hook, InterceptPoint, Interceptor, PluginArgs, PluginDescriptor, Service,
        Transformer,
    };
    pub use docgate_core::{
        BoxFuture, Container, DataAccess, Exchange, GateError, GateResult, RequestView,
        ResourceRef, VersionToken,
    };
    pub use crate::{Docgate, DocgateConfig};
}
