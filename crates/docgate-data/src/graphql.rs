//! GraphQL service shell.
//!
//! Queries are POSTed to `<mount>/<app-uri>`. The app definition is a
//! document of the configured apps collection whose `descriptor.uri` equals
//! the path suffix; schema compilation and execution belong to a
//! [`GraphQlExecutor`] collaborator taken from the container.
//!
//! ```text
//!  POST /graphql/shop ─► init_request ─► GraphQlApps (cache) ─► DataAccess
//!                              │
//!                              ▼
//!                     handle ─► GraphQlExecutor ─► {"data", "errors"}
//! ```
//!
//! Three plugins share one [`GraphQlApps`]: the service, the
//! `graphAppDefinitionEscaper` interceptor, and an initializer registering
//! the hook that drops cached definitions after writes to the apps
//! collection.

use crate::transformers::escape_keys;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use docgate_core::plugin::{
    GlobalHook, Hook, Initializer, InterceptPoint, Interceptor, PluginArgs, PluginDescriptor,
    PluginRegistry, Service,
};
use docgate_core::{
    AttachmentKey, BoxFuture, DataAccess, Exchange, GateError, GateResult, ResourceRef,
};
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Default database holding app definitions.
pub const DEFAULT_APPS_DB: &str = "docgate";
/// Default collection holding app definitions.
pub const DEFAULT_APPS_COLLECTION: &str = "gqlapps";

const APP_URI_FIELD: &str = "uri";
const APP_ENABLED_FIELD: &str = "enabled";

/// The app definition resolved for the current request.
pub const GRAPHQL_APP: AttachmentKey<Arc<Value>> = AttachmentKey::new("graphql-app");

/// A GraphQL request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    /// The query document.
    pub query: Option<String>,
    /// Operation to run when the document holds several.
    pub operation_name: Option<String>,
    /// Query variables.
    pub variables: Option<Value>,
}

/// Result of an execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphQlResponse {
    /// Query data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Execution errors.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

/// Compiles app definitions and executes queries against them.
pub trait GraphQlExecutor: Send + Sync + 'static {
    /// Executes `request` against the app definition.
    fn execute<'a>(
        &'a self,
        app: &'a Value,
        request: &'a GraphQlRequest,
    ) -> BoxFuture<'a, GateResult<GraphQlResponse>>;
}

/// Where app definitions are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppsLocation {
    /// Database name.
    pub db: String,
    /// Collection name.
    pub collection: String,
}

impl AppsLocation {
    fn matches(&self, resource: Option<&ResourceRef>) -> bool {
        resource.is_some_and(|r| {
            r.db() == Some(self.db.as_str()) && r.collection().as_deref() == Some(self.collection.as_str())
        })
    }
}

/// Loading cache of app definitions keyed by app uri.
///
/// Only found apps are cached. A load that overlaps [`GraphQlApps::invalidate_all`]
/// is not cached, so a definition written meanwhile is seen by the next lookup.
#[derive(Debug, Default)]
pub struct GraphQlApps {
    location: OnceLock<AppsLocation>,
    definitions: DashMap<String, Arc<Value>>,
    epoch: AtomicU64,
}

impl GraphQlApps {
    /// Creates an empty cache with no location.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the apps location. It can be set once.
    pub fn configure(&self, location: AppsLocation) -> GateResult<()> {
        let current = self.location.get_or_init(|| location.clone());
        if *current == location {
            Ok(())
        } else {
            Err(GateError::configuration(format!(
                "graphql apps location already set to '{}/{}'",
                current.db, current.collection
            )))
        }
    }

    /// Returns the configured location.
    pub fn location(&self) -> Option<&AppsLocation> {
        self.location.get()
    }

    /// Returns the enabled app definition mounted at `uri`.
    pub async fn lookup(&self, data: &dyn DataAccess, uri: &str) -> GateResult<Option<Arc<Value>>> {
        if let Some(cached) = self.definitions.get(uri) {
            return Ok(Some(Arc::clone(cached.value())));
        }
        let Some(location) = self.location() else {
            return Ok(None);
        };

        let started = self.epoch.load(Ordering::SeqCst);
        let Some(found) = Self::load(data, location, uri).await? else {
            tracing::debug!(app = uri, "graphql app definition not found");
            return Ok(None);
        };

        tracing::debug!(app = uri, "graphql app definition loaded");
        if let Entry::Vacant(vacant) = self.definitions.entry(uri.to_string()) {
            if self.epoch.load(Ordering::SeqCst) == started {
                vacant.insert(Arc::clone(&found));
            }
        }
        Ok(Some(found))
    }

    async fn load(
        data: &dyn DataAccess,
        location: &AppsLocation,
        uri: &str,
    ) -> GateResult<Option<Arc<Value>>> {
        let collection = ResourceRef::Collection {
            db: location.db.clone(),
            coll: location.collection.clone(),
        };
        let ids = match data.list_names(&collection).await {
            Ok(ids) => ids,
            Err(err) if err.status_code() == StatusCode::NOT_FOUND => Vec::new(),
            Err(err) => return Err(err),
        };

        for id in ids {
            let document = ResourceRef::Document {
                db: location.db.clone(),
                coll: location.collection.clone(),
                id,
            };
            if let Some(stored) = data.read(&document).await? {
                if is_enabled_app(&stored.content, uri) {
                    return Ok(Some(Arc::new(stored.content)));
                }
            }
        }
        Ok(None)
    }

    /// Drops every cached definition.
    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.definitions.clear();
    }

    /// Returns the number of cached definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn is_enabled_app(definition: &Value, uri: &str) -> bool {
    let Some(descriptor) = definition.get("descriptor") else {
        return false;
    };
    descriptor.get(APP_URI_FIELD).and_then(Value::as_str) == Some(uri)
        && descriptor.get(APP_ENABLED_FIELD).and_then(Value::as_bool) == Some(true)
}

/// A write creating or changing one document: PUT or PATCH on a document,
/// POST to its collection.
fn is_document_write(method: &Method, resource: Option<&ResourceRef>) -> bool {
    match resource {
        Some(ResourceRef::Document { .. }) => *method == Method::PUT || *method == Method::PATCH,
        Some(ResourceRef::Collection { .. }) => *method == Method::POST,
        _ => false,
    }
}

/// Serves GraphQL queries for the app definitions of one collection.
pub struct GraphQlService {
    data: Arc<dyn DataAccess>,
    executor: Arc<dyn GraphQlExecutor>,
    apps: Arc<GraphQlApps>,
}

impl GraphQlService {
    /// Plugin name.
    pub const NAME: &'static str = "graphql";

    /// Creates the service over a configured [`GraphQlApps`].
    pub fn new(
        data: Arc<dyn DataAccess>,
        executor: Arc<dyn GraphQlExecutor>,
        apps: Arc<GraphQlApps>,
    ) -> Self {
        Self {
            data,
            executor,
            apps,
        }
    }

    fn parse_request(exchange: &Exchange) -> GateResult<GraphQlRequest> {
        let request = exchange.request();
        let is_graphql = request
            .content_type()
            .is_some_and(|ct| ct.starts_with("application/graphql"));

        if is_graphql {
            let query = std::str::from_utf8(request.raw_body())
                .map_err(|_| GateError::bad_request("query is not valid UTF-8"))?;
            return Ok(GraphQlRequest {
                query: Some(query.to_string()),
                operation_name: None,
                variables: None,
            });
        }

        match request.content() {
            Some(content @ Value::Object(_)) => serde_json::from_value(content.clone())
                .map_err(|err| GateError::bad_request(format!("invalid GraphQL request: {err}"))),
            _ => Err(GateError::bad_request("a GraphQL request must be a json object")),
        }
    }
}

impl Service for GraphQlService {
    fn default_uri(&self) -> Option<&str> {
        Some("/graphql")
    }

    fn init_request<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            let uri = exchange.request().relative_path().trim_matches('/').to_string();
            if uri.is_empty() {
                return Err(GateError::not_found("GraphQL app uri missing"));
            }
            let Some(app) = self.apps.lookup(self.data.as_ref(), &uri).await? else {
                return Err(GateError::not_found(format!("GraphQL app '{uri}' not found")));
            };
            exchange.attachments_mut().put(&GRAPHQL_APP, app);
            Ok(())
        })
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            if *exchange.request().method() != Method::POST {
                exchange
                    .response_mut()
                    .set_in_error(StatusCode::METHOD_NOT_ALLOWED, "only POST is allowed");
                return Ok(());
            }

            let request = Self::parse_request(exchange)?;
            if request.query.as_deref().map_or(true, str::is_empty) {
                return Err(GateError::bad_request("query cannot be null"));
            }
            let Some(app) = exchange.attachments().get(&GRAPHQL_APP).cloned() else {
                return Err(GateError::internal("GraphQL app definition not resolved"));
            };

            let result = self.executor.execute(&app, &request).await?;
            let body = serde_json::to_value(&result)?;
            let response = exchange.response_mut();
            if result.errors.is_empty() {
                response.set_status(StatusCode::OK);
            } else {
                response.set_in_error(StatusCode::BAD_REQUEST, "Bad Request");
            }
            response.set_content(body);
            Ok(())
        })
    }
}

/// Escapes keys of app definitions written to the apps collection.
#[derive(Debug)]
pub struct GraphAppDefinitionEscaper {
    apps: Arc<GraphQlApps>,
}

impl GraphAppDefinitionEscaper {
    /// Plugin name.
    pub const NAME: &'static str = "graphAppDefinitionEscaper";

    /// Creates the escaper.
    pub const fn new(apps: Arc<GraphQlApps>) -> Self {
        Self { apps }
    }
}

impl Interceptor for GraphAppDefinitionEscaper {
    fn intercept_point(&self) -> InterceptPoint {
        InterceptPoint::AfterAuth
    }

    fn resolve(&self, exchange: &Exchange) -> bool {
        let request = exchange.request();
        is_document_write(request.method(), request.resource())
            && request.content().is_some()
            && self
                .apps
                .location()
                .is_some_and(|location| location.matches(request.resource()))
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            if let Some(content) = exchange.request_mut().content_mut() {
                *content = escape_keys(content, true);
            }
            Ok(())
        })
    }
}

struct AppCacheInvalidator {
    apps: Arc<GraphQlApps>,
}

impl Hook for AppCacheInvalidator {
    fn hook<'a>(&'a self, _exchange: &'a Exchange, _args: &'a PluginArgs) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            self.apps.invalidate_all();
            Ok(())
        })
    }
}

/// Registers the global hook that drops cached app definitions after
/// applied writes to the apps collection.
pub struct GraphQlCacheInitializer {
    apps: Arc<GraphQlApps>,
}

impl GraphQlCacheInitializer {
    /// Plugin name.
    pub const NAME: &'static str = "graphAppDefinitionCacheInitializer";
}

impl Initializer for GraphQlCacheInitializer {
    fn init(&self, registry: &PluginRegistry) -> GateResult<()> {
        let apps = Arc::clone(&self.apps);
        let hook = AppCacheInvalidator {
            apps: Arc::clone(&self.apps),
        };
        registry.add_global_hook(GlobalHook::new("graphql-app-cache", Arc::new(hook)).when(
            move |exchange| {
                let applied = exchange
                    .response()
                    .operation_result()
                    .is_some_and(|r| r.is_applied());
                applied
                    && apps
                        .location()
                        .is_some_and(|location| location.matches(exchange.request().resource()))
            },
        ))
    }
}

/// Returns the descriptors of the GraphQL plugins, sharing one app cache.
///
/// The service is disabled by default: it needs a [`GraphQlExecutor`] in the
/// container. Its arguments are `db` and `collection`.
pub fn descriptors() -> Vec<PluginDescriptor> {
    let apps = Arc::new(GraphQlApps::new());

    let service_apps = Arc::clone(&apps);
    let service = PluginDescriptor::service(GraphQlService::NAME, move |ctx| {
        let location = AppsLocation {
            db: ctx.arg::<String>("db")?.unwrap_or_else(|| DEFAULT_APPS_DB.to_string()),
            collection: ctx
                .arg::<String>("collection")?
                .unwrap_or_else(|| DEFAULT_APPS_COLLECTION.to_string()),
        };
        let data = ctx.require::<dyn DataAccess>()?;
        let executor = ctx.require::<dyn GraphQlExecutor>()?;
        service_apps.configure(location)?;
        Ok(GraphQlService::new(data, executor, Arc::clone(&service_apps)))
    })
    .description("executes GraphQL queries against stored app definitions")
    .disabled_by_default();

    let escaper_apps = Arc::clone(&apps);
    let escaper = PluginDescriptor::interceptor(GraphAppDefinitionEscaper::NAME, move |_| {
        Ok(GraphAppDefinitionEscaper::new(Arc::clone(&escaper_apps)))
    })
    .description("escapes keys of GraphQL app definitions");

    let initializer = PluginDescriptor::initializer(GraphQlCacheInitializer::NAME, move |_| {
        Ok(GraphQlCacheInitializer {
            apps: Arc::clone(&apps),
        })
    })
    .description("drops cached GraphQL app definitions on writes");

    vec![service, escaper, initializer]
}
