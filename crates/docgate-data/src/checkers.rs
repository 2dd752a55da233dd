//! Content checkers and the helpers they share.

use docgate_core::plugin::{Checker, PluginArgs, PluginDescriptor};
use docgate_core::{GateResult, RequestView};
use serde_json::Value;

/// Returns `true` when the request writes several documents at once.
pub(crate) fn is_bulk_request(content: &Value) -> bool {
    content.is_array()
}

/// Returns `true` when the content uses update operators (`$`-prefixed
/// top-level keys). For arrays every element must use them.
pub(crate) fn uses_update_operators(content: &Value) -> bool {
    match content {
        Value::Object(map) => map.keys().any(|key| key.starts_with('$')),
        Value::Array(items) => items.iter().all(uses_update_operators),
        _ => false,
    }
}

/// Returns `true` when any key uses dot notation. For arrays any element
/// counts.
pub(crate) fn uses_dot_notation(content: &Value) -> bool {
    match content {
        Value::Object(map) => map.keys().any(|key| key.contains('.')),
        Value::Array(items) => items.iter().any(uses_dot_notation),
        _ => false,
    }
}

/// Bounds the serialized size of written content.
///
/// Arguments: `max` (bytes, required) and `min` (bytes, default 0). Declared
/// arguments override configured ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentSizeChecker;

impl ContentSizeChecker {
    /// Plugin name.
    pub const NAME: &'static str = "checkContentSize";

    /// Returns the plugin descriptor.
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::checker(Self::NAME, |_| Ok(Self))
            .description("checks the size of the request content")
    }
}

impl Checker for ContentSizeChecker {
    fn check(&self, request: &RequestView, content: &Value, args: &PluginArgs) -> GateResult<bool> {
        let Some(max) = args.get("max").and_then(Value::as_u64) else {
            tracing::warn!(checker = Self::NAME, "missing 'max' argument, content rejected");
            return Ok(false);
        };
        let min = args.get("min").and_then(Value::as_u64).unwrap_or(0);

        let size = if request.raw_body().is_empty() {
            content.to_string().len()
        } else {
            request.raw_body().len()
        };
        let size = u64::try_from(size).unwrap_or(u64::MAX);
        tracing::debug!(checker = Self::NAME, size, min, max, "content size checked");
        Ok((min..=max).contains(&size))
    }
}
