//! # Docgate Server
//!
//! HTTP server for the Docgate pipeline:
//!
//! - HTTP/1.1 via hyper
//! - Body and processing timeouts (408 / 504) and a body size limit (413)
//! - Requests run on their own task, so a timeout never cancels a stage
//! - Response-async phase spawned after the response is sent
//! - Graceful shutdown on SIGTERM / SIGINT
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgate_server::{Server, ServerConfig};
//!
//! let server = Server::new(ServerConfig::default(), Arc::new(pipeline));
//! server.run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/docgate-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod server;
mod shutdown;

pub use error::ServerError;
pub use server::{Server, ServerConfig};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
