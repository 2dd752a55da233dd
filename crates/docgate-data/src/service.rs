//! The document service.

use crate::coordinator::WriteCoordinator;
use crate::handlers::{self, PagingLimits};
use crate::request::parse_path;
use docgate_core::plugin::{PluginDescriptor, Service};
use docgate_core::{
    AttachmentKey, BoxFuture, DataAccess, Exchange, GateError, GateResult, MetadataCache,
    ResourceRef,
};
use http::Method;
use std::sync::Arc;

/// Set when the request addresses the stored content of a file.
const FILE_BINARY: AttachmentKey<bool> = AttachmentKey::new("file-binary");

/// Serves databases, collections, documents and files.
///
/// The request initializer resolves the addressed resource and loads the
/// properties of its database or collection, so interceptors and the
/// metadata-declared plugins can see them before the handler runs. Writes go
/// through the [`WriteCoordinator`].
#[derive(Debug, Clone)]
pub struct DocumentService {
    coordinator: WriteCoordinator,
    limits: PagingLimits,
}

impl DocumentService {
    /// Plugin name.
    pub const NAME: &'static str = "documents";

    /// Creates the service.
    pub fn new(data: Arc<dyn DataAccess>, cache: Arc<dyn MetadataCache>) -> Self {
        Self {
            coordinator: WriteCoordinator::new(data, cache),
            limits: PagingLimits::default(),
        }
    }

    /// Sets the listing page size limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: PagingLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the write coordinator.
    pub const fn coordinator(&self) -> &WriteCoordinator {
        &self.coordinator
    }

    /// Returns the plugin descriptor.
    ///
    /// Requires `Arc<dyn DataAccess>` and `Arc<dyn MetadataCache>` in the
    /// container. Reads the optional `default_pagesize` and `max_pagesize`
    /// arguments.
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::service(Self::NAME, |ctx| {
            let data = ctx.require::<dyn DataAccess>()?;
            let cache = ctx.require::<dyn MetadataCache>()?;
            let defaults = PagingLimits::default();
            let limits = PagingLimits {
                default_pagesize: ctx
                    .arg("default_pagesize")?
                    .unwrap_or(defaults.default_pagesize),
                max_pagesize: ctx.arg("max_pagesize")?.unwrap_or(defaults.max_pagesize),
            };
            if limits.default_pagesize > limits.max_pagesize {
                return Err(GateError::configuration(format!(
                    "default_pagesize {} exceeds max_pagesize {}",
                    limits.default_pagesize, limits.max_pagesize
                )));
            }
            Ok(Self::new(data, cache).with_limits(limits))
        })
        .description("databases, collections, documents and files")
    }

    fn resource(exchange: &Exchange) -> GateResult<ResourceRef> {
        exchange
            .request()
            .resource()
            .cloned()
            .ok_or_else(|| GateError::internal("request resource not resolved"))
    }
}

impl Service for DocumentService {
    fn default_uri(&self) -> Option<&str> {
        Some("/")
    }

    fn init_request<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            let parsed = parse_path(exchange.request().relative_path())?;
            let props = match parsed.resource {
                ResourceRef::Root => None,
                _ => self.coordinator.cache().get(&parsed.resource.cache_key()).await?,
            };
            let request = exchange.request_mut();
            request.set_resource(parsed.resource);
            request.set_collection_props(props);
            if parsed.binary {
                exchange.attachments_mut().put(&FILE_BINARY, true);
            }
            Ok(())
        })
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            let resource = Self::resource(exchange)?;
            let coordinator = &self.coordinator;
            let method = exchange.request().method().clone();

            if exchange.attachments().get(&FILE_BINARY).copied().unwrap_or(false) {
                return match method {
                    Method::GET => handlers::get_file_binary(coordinator, exchange, &resource).await,
                    _ => {
                        handlers::method_not_allowed(exchange, &resource);
                        Ok(())
                    }
                };
            }

            match method {
                Method::GET => handlers::get(coordinator, self.limits, exchange, &resource).await,
                Method::PUT => handlers::put(coordinator, exchange, &resource).await,
                Method::PATCH => handlers::patch(coordinator, exchange, &resource).await,
                Method::POST => handlers::post(coordinator, exchange, &resource).await,
                Method::DELETE => handlers::delete(coordinator, exchange, &resource).await,
                _ => {
                    handlers::method_not_allowed(exchange, &resource);
                    Ok(())
                }
            }
        })
    }
}
