//! # Docgate Core
//!
//! Core types and plugin contracts for the Docgate document gateway.
//!
//! This crate provides the foundational types used throughout Docgate:
//!
//! - [`Exchange`] - Per-request state: request view, response view and typed attachments
//! - [`RequestId`] - UUID v7 request identifier
//! - [`Principal`] - Authenticated caller identity
//! - [`GateError`] - Standard error type with HTTP status mapping
//! - [`Container`] - Type-keyed registry of shared collaborators
//! - [`DataAccess`] / [`MetadataCache`] - Storage collaborator interfaces
//! - [`plugin`] - Plugin kinds, traits, records, discovery and the [`PluginRegistry`]
//!
//! ## Plugin Kinds
//!
//! | Kind | Runs at | Contract |
//! |------|---------|----------|
//! | Service | handler stage | [`plugin::Service`] |
//! | Interceptor | one intercept point | [`plugin::Interceptor`] |
//! | Hook | after the response is sent | [`plugin::Hook`] |
//! | Transformer | request or response phase | [`plugin::Transformer`] |
//! | Checker | before writes | [`plugin::Checker`] |
//! | AuthMechanism / Authenticator / Authorizer / TokenManager | security stage | [`plugin`] |
//! | Initializer | once at startup | [`plugin::Initializer`] |

#![doc(html_root_url = "https://docs.rs/docgate-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod attachment;
mod data;
mod di;
mod error;
mod exchange;
mod identity;
pub mod plugin;

use std::future::Future;
use std::pin::Pin;

pub use attachment::{AttachmentKey, Attachments};
pub use data::{
    DataAccess, MetadataCache, OperationResult, ResourceRef, StoredDocument, VersionToken,
    WriteOp, WriteRequest,
};
pub use di::Container;
pub use error::{ErrorCategory, GateError, GateResult};
pub use exchange::{
    Exchange, MdcContext, RequestId, RequestView, ResourceType, ResponseView, MDC_CONTEXT,
};
pub use identity::Principal;
pub use plugin::PluginRegistry;

/// A boxed future that is `Send`.
///
/// Every asynchronous plugin contract returns this type so the traits stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
