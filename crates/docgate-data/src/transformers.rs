//! Key escaping transformers.
//!
//! Document stores reject keys starting with `$` or containing `.`, yet
//! aggregation pipelines and GraphQL app definitions are full of them. Such
//! keys are escaped on the way in and unescaped on the way out:
//!
//! | Raw | Stored |
//! |-----|--------|
//! | `$match` | `_$match` |
//! | `a.b` | `a::b` |

use docgate_core::plugin::{
    GlobalTransformer, Initializer, Phase, PluginArgs, PluginDescriptor, PluginRegistry, Scope,
    Transformer,
};
use docgate_core::{Exchange, GateResult, RequestView, ResourceType};
use http::Method;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Collection property holding aggregation definitions.
pub const AGGREGATIONS_KEY: &str = "aggrs";

/// Escapes `$` prefixes, and dots when `escape_dots` is set, in every key.
pub fn escape_keys(value: &Value, escape_dots: bool) -> Value {
    map_keys(value, &|key| {
        let key = match key.strip_prefix('$') {
            Some(rest) => format!("_${rest}"),
            None => key.to_string(),
        };
        if escape_dots {
            key.replace('.', "::")
        } else {
            key
        }
    })
}

/// Reverses [`escape_keys`].
pub fn unescape_keys(value: &Value) -> Value {
    map_keys(value, &|key| {
        let key = match key.strip_prefix("_$") {
            Some(rest) => format!("${rest}"),
            None => key.to_string(),
        };
        key.replace("::", ".")
    })
}

fn map_keys(value: &Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (rename(key), map_keys(value, rename)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_keys(v, rename)).collect()),
        other => other.clone(),
    }
}

/// Escapes or unescapes every key of the content.
///
/// Declared in collection metadata as `escapeKeys` (request phase) or
/// `unescapeKeys` (response phase).
#[derive(Debug, Clone, Copy)]
pub struct KeyEscaper {
    unescape: bool,
}

impl KeyEscaper {
    /// Name of the escaping plugin.
    pub const ESCAPE: &'static str = "escapeKeys";
    /// Name of the unescaping plugin.
    pub const UNESCAPE: &'static str = "unescapeKeys";

    /// Returns the descriptors of both plugins.
    pub fn descriptors() -> [PluginDescriptor; 2] {
        [
            PluginDescriptor::transformer(Self::ESCAPE, |_| Ok(Self { unescape: false }))
                .description("escapes $ prefixed and dotted keys"),
            PluginDescriptor::transformer(Self::UNESCAPE, |_| Ok(Self { unescape: true }))
                .description("unescapes keys escaped by escapeKeys"),
        ]
    }
}

impl Transformer for KeyEscaper {
    fn transform(&self, _request: &RequestView, content: &mut Value, args: &PluginArgs) -> GateResult<()> {
        *content = if self.unescape {
            unescape_keys(content)
        } else {
            let escape_dots = args.get("escapeDots").and_then(Value::as_bool).unwrap_or(true);
            escape_keys(content, escape_dots)
        };
        Ok(())
    }
}

/// Escapes the aggregation definitions of collections on writes and
/// unescapes them on reads, including collections listed by a database.
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregationTransformer;

impl AggregationTransformer {
    fn apply(request: &RequestView, content: &mut Value) {
        match request.resource_type() {
            ResourceType::Collection => {
                let Some(aggrs) = content.get(AGGREGATIONS_KEY).filter(|a| a.is_array()) else {
                    return;
                };
                let transformed = match *request.method() {
                    Method::PUT | Method::PATCH => escape_keys(aggrs, true),
                    Method::GET => unescape_keys(aggrs),
                    _ => return,
                };
                content[AGGREGATIONS_KEY] = transformed;
            }
            ResourceType::Database if request.is_get() => {
                let Some(colls) = content.get_mut("_embedded").and_then(Value::as_array_mut) else {
                    return;
                };
                for coll in colls.iter_mut().filter(|c| c.is_object()) {
                    if let Some(aggrs) = coll.get(AGGREGATIONS_KEY).filter(|a| a.is_array()) {
                        let unescaped = unescape_keys(aggrs);
                        coll[AGGREGATIONS_KEY] = unescaped;
                    }
                }
            }
            _ => {}
        }
    }
}

impl Transformer for AggregationTransformer {
    fn transform(&self, request: &RequestView, content: &mut Value, _args: &PluginArgs) -> GateResult<()> {
        Self::apply(request, content);
        Ok(())
    }
}

/// Registers the [`AggregationTransformer`] as a global transformer for both
/// phases.
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregationTransformerInitializer;

impl AggregationTransformerInitializer {
    /// Plugin name.
    pub const NAME: &'static str = "aggregationTransformerInitializer";

    /// Returns the plugin descriptor.
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::initializer(Self::NAME, |_| Ok(Self))
            .description("registers the global aggregation transformers")
    }
}

fn targets_collections(exchange: &Exchange) -> bool {
    matches!(
        exchange.request().resource_type(),
        ResourceType::Collection | ResourceType::Database
    )
}

impl Initializer for AggregationTransformerInitializer {
    fn init(&self, registry: &PluginRegistry) -> GateResult<()> {
        let transformer: Arc<dyn Transformer> = Arc::new(AggregationTransformer);
        registry.add_global_transformer(
            GlobalTransformer::new(
                "aggregations-request",
                Arc::clone(&transformer),
                Phase::Request,
                Scope::This,
            )
            .when(targets_collections),
        )?;
        registry.add_global_transformer(
            GlobalTransformer::new("aggregations-response", transformer, Phase::Response, Scope::This)
                .when(targets_collections),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::ResourceRef;
    use serde_json::json;

    #[test]
    fn test_escape_round_trip() {
        let raw = json!([{"$match": {"a.b": {"$gt": 1}}}]);
        let escaped = escape_keys(&raw, true);
        assert_eq!(escaped, json!([{"_$match": {"a::b": {"_$gt": 1}}}]));
        assert_eq!(unescape_keys(&escaped), raw);

        let dots_kept = escape_keys(&json!({"a.b": 1}), false);
        assert_eq!(dots_kept, json!({"a.b": 1}));
    }

    fn collection_request(method: Method) -> RequestView {
        let mut request = RequestView::new(method, "/db/coll");
        request.set_resource(ResourceRef::Collection {
            db: "db".into(),
            coll: "coll".into(),
        });
        request
    }

    #[test]
    fn test_aggregations_escaped_on_put_and_unescaped_on_get() {
        let mut content = json!({"aggrs": [{"stages": [{"$match": {}}]}], "other": {"$keep": 1}});
        AggregationTransformer::apply(&collection_request(Method::PUT), &mut content);
        assert_eq!(content["aggrs"][0]["stages"][0], json!({"_$match": {}}));
        assert_eq!(content["other"], json!({"$keep": 1}));

        AggregationTransformer::apply(&collection_request(Method::GET), &mut content);
        assert_eq!(content["aggrs"][0]["stages"][0], json!({"$match": {}}));
    }

    #[test]
    fn test_database_listing_unescaped() {
        let mut request = RequestView::new(Method::GET, "/db");
        request.set_resource(ResourceRef::Database { db: "db".into() });
        let mut content = json!({"_embedded": [{"_id": "c", "aggrs": [{"_$match": {}}]}]});

        AggregationTransformer::apply(&request, &mut content);
        assert_eq!(content["_embedded"][0]["aggrs"][0], json!({"$match": {}}));
    }
}
