//! Service routing.
//!
//! Maps a request path to exactly one enabled service by mount prefix. Mounts
//! match on whole path segments (`/graphql` matches `/graphql/shop` but not
//! `/graphqlx`) and the longest matching mount wins, so a service mounted at
//! `/` acts as the fallback.
//!
//! Two enabled services mounted at the same prefix are rejected when the
//! router is built.
//!
//! ```
//! # use std::sync::Arc;
//! # use docgate_core::plugin::{PluginInstance, PluginRecord, Service};
//! # use docgate_core::{BoxFuture, Exchange, GateResult};
//! # struct Noop;
//! # impl Service for Noop {
//! #     fn handle<'a>(&'a self, _e: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
//! #         Box::pin(async { Ok(()) })
//! #     }
//! # }
//! use docgate_pipeline::ServiceRouter;
//!
//! let root = Arc::new(PluginRecord::new("documents", PluginInstance::Service(Arc::new(Noop)))
//!     .with_conf_args(serde_json::json!({"uri": "/"})));
//! let graphql = Arc::new(PluginRecord::new("graphql", PluginInstance::Service(Arc::new(Noop))));
//!
//! let router = ServiceRouter::new([root, graphql]).unwrap();
//! assert_eq!(router.resolve("/graphql/shop").unwrap().record().name(), "graphql");
//! assert_eq!(router.resolve("/shop/orders").unwrap().record().name(), "documents");
//! ```

use docgate_core::plugin::{PluginKind, PluginRecord, PluginRegistry};
use docgate_core::{GateError, GateResult};
use std::sync::Arc;

/// A resolved route: the service record and the mount it matched.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    record: &'a Arc<PluginRecord>,
    mount: &'a str,
}

impl<'a> RouteMatch<'a> {
    /// Returns the matched service record.
    pub const fn record(&self) -> &'a Arc<PluginRecord> {
        self.record
    }

    /// Returns the matched mount point.
    pub const fn mount(&self) -> &'a str {
        self.mount
    }
}

#[derive(Debug)]
struct Mount {
    uri: String,
    segments: Vec<String>,
    record: Arc<PluginRecord>,
}

/// Routes requests to services.
#[derive(Debug, Default)]
pub struct ServiceRouter {
    // longest mount first
    mounts: Vec<Mount>,
}

impl ServiceRouter {
    /// Builds a router from the enabled services of the registry.
    pub fn from_registry(registry: &PluginRegistry) -> GateResult<Self> {
        Self::new(registry.enabled(PluginKind::Service)?)
    }

    /// Builds a router from service records. Disabled records are ignored.
    pub fn new<I>(records: I) -> GateResult<Self>
    where
        I: IntoIterator<Item = Arc<PluginRecord>>,
    {
        let mut mounts: Vec<Mount> = Vec::new();

        for record in records {
            if !record.is_enabled() {
                continue;
            }
            let Some(uri) = record.mount_uri() else {
                return Err(GateError::configuration(format!(
                    "plugin '{}' is a {} and cannot be mounted",
                    record.name(),
                    record.kind()
                )));
            };
            if !uri.starts_with('/') {
                return Err(GateError::configuration(format!(
                    "service '{}' mount '{uri}' must start with '/'",
                    record.name()
                )));
            }

            let segments = split_segments(&uri);
            let uri = normalize(&segments);
            if let Some(existing) = mounts.iter().find(|m| m.uri == uri) {
                return Err(GateError::configuration(format!(
                    "services '{}' and '{}' are both mounted at '{uri}'",
                    existing.record.name(),
                    record.name()
                )));
            }

            tracing::debug!(service = record.name(), mount = %uri, "service mounted");
            mounts.push(Mount {
                uri,
                segments,
                record,
            });
        }

        mounts.sort_by(|a, b| b.segments.len().cmp(&a.segments.len()));
        Ok(Self { mounts })
    }

    /// Returns the service mounted at the longest prefix of `path`.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let segments = split_segments(path);
        self.mounts
            .iter()
            .find(|mount| {
                mount.segments.len() <= segments.len()
                    && mount
                        .segments
                        .iter()
                        .zip(&segments)
                        .all(|(mount_segment, segment)| mount_segment == segment)
            })
            .map(|mount| RouteMatch {
                record: &mount.record,
                mount: &mount.uri,
            })
    }

    /// Returns `(mount, service name)` pairs, longest mount first.
    pub fn mounts(&self) -> Vec<(&str, &str)> {
        self.mounts
            .iter()
            .map(|m| (m.uri.as_str(), m.record.name()))
            .collect()
    }

    /// Returns the number of mounted services.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Returns `true` when no service is mounted.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn normalize(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::plugin::{PluginInstance, Service};
    use docgate_core::{BoxFuture, Exchange};
    use proptest::prelude::*;

    struct Noop;

    impl Service for Noop {
        fn handle<'a>(&'a self, _exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn service(name: &str, uri: &str) -> Arc<PluginRecord> {
        Arc::new(
            PluginRecord::new(name, PluginInstance::Service(Arc::new(Noop)))
                .with_conf_args(serde_json::json!({ "uri": uri })),
        )
    }

    #[test]
    fn test_longest_prefix_wins() {
        let router = ServiceRouter::new([
            service("root", "/"),
            service("graphql", "/graphql"),
            service("admin", "/graphql/admin"),
        ])
        .unwrap();

        assert_eq!(router.resolve("/").unwrap().record().name(), "root");
        assert_eq!(router.resolve("/graphql").unwrap().record().name(), "graphql");
        assert_eq!(router.resolve("/graphql/app").unwrap().mount(), "/graphql");
        assert_eq!(router.resolve("/graphql/admin/x").unwrap().record().name(), "admin");
        assert_eq!(router.resolve("/graphqlx").unwrap().record().name(), "root");
    }

    #[test]
    fn test_no_match() {
        let router = ServiceRouter::new([service("graphql", "/graphql")]).unwrap();
        assert!(router.resolve("/db/coll").is_none());
        assert!(router.resolve("/").is_none());
    }

    #[test]
    fn test_duplicate_mount_is_configuration_error() {
        let err = ServiceRouter::new([service("a", "/x/"), service("b", "/x")]).unwrap_err();
        assert_eq!(err.category(), docgate_core::ErrorCategory::Configuration);
        assert!(err.to_string().contains("'a' and 'b'"));
    }

    #[test]
    fn test_disabled_services_do_not_conflict() {
        let disabled = Arc::new(
            PluginRecord::new("old", PluginInstance::Service(Arc::new(Noop)))
                .with_conf_args(serde_json::json!({ "uri": "/x" }))
                .with_enabled(false),
        );
        let router = ServiceRouter::new([disabled, service("new", "/x")]).unwrap();
        assert_eq!(router.len(), 1);
        assert_eq!(router.resolve("/x").unwrap().record().name(), "new");
    }

    #[test]
    fn test_relative_mount_rejected() {
        let err = ServiceRouter::new([service("a", "x")]).unwrap_err();
        assert!(err.to_string().contains("must start with '/'"));
    }

    #[test]
    fn test_default_mount_is_name() {
        let record = Arc::new(PluginRecord::new(
            "ping",
            PluginInstance::Service(Arc::new(Noop)),
        ));
        let router = ServiceRouter::new([record]).unwrap();
        assert_eq!(router.mounts(), [("/ping", "ping")]);
    }

    proptest! {
        #[test]
        fn prop_mounted_prefix_always_resolves(
            mount in proptest::collection::vec("[a-z]{1,6}", 1..4),
            rest in proptest::collection::vec("[a-z0-9]{1,6}", 0..4),
        ) {
            let uri = format!("/{}", mount.join("/"));
            let router = ServiceRouter::new([service("root", "/"), service("svc", &uri)]).unwrap();
            let mut path = uri.clone();
            for segment in &rest {
                path.push('/');
                path.push_str(segment);
            }
            let matched = router.resolve(&path).unwrap();
            prop_assert_eq!(matched.record().name(), "svc");
            prop_assert_eq!(matched.mount(), uri.as_str());
        }
    }
}
