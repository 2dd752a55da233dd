//! Plugin declarations carried in resource metadata.
//!
//! A collection (or database) can name the plugins that apply to it:
//!
//! ```json
//! {
//!   "hooks": [{ "name": "snooper", "args": { "level": "info" } }],
//!   "rts": [{ "name": "filterProperties", "phase": "RESPONSE", "scope": "CHILDREN" }],
//!   "checkers": [{ "name": "checkContentSize", "args": { "max": 1024 } }]
//! }
//! ```
//!
//! Names are resolved against the registry when a request runs; a name that
//! is not registered is reported as a warning rather than failing the request.

use super::kind::{Phase, Scope};
use crate::error::{GateError, GateResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata key listing hooks.
pub const HOOKS_KEY: &str = "hooks";
/// Metadata key listing representation transformers.
pub const TRANSFORMERS_KEY: &str = "rts";
/// Metadata key listing checkers.
pub const CHECKERS_KEY: &str = "checkers";

/// A hook named in resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookDeclaration {
    /// Registered hook name.
    pub name: String,
    /// Invocation arguments.
    #[serde(default)]
    pub args: Value,
}

/// A transformer named in resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformerDeclaration {
    /// Registered transformer name.
    pub name: String,
    /// Request or response content.
    pub phase: Phase,
    /// Resource itself or its children.
    #[serde(default)]
    pub scope: Scope,
    /// Invocation arguments.
    #[serde(default)]
    pub args: Value,
}

/// A checker named in resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckerDeclaration {
    /// Registered checker name.
    pub name: String,
    /// Invocation arguments.
    #[serde(default)]
    pub args: Value,
    /// Lets writes through when the checker does not support them.
    #[serde(default, rename = "skipNotSupported")]
    pub skip_not_supported: bool,
}

/// The plugin declarations of one resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMetadata {
    /// Hooks, in declaration order.
    pub hooks: Vec<HookDeclaration>,
    /// Transformers, in declaration order.
    pub transformers: Vec<TransformerDeclaration>,
    /// Checkers, in declaration order.
    pub checkers: Vec<CheckerDeclaration>,
}

impl ResourceMetadata {
    /// Parses the declarations in a resource's properties.
    ///
    /// Absent keys yield empty lists. A malformed declaration fails with a
    /// 406 naming the offending key.
    pub fn from_props(props: &Value) -> GateResult<Self> {
        Ok(Self {
            hooks: parse_list(props, HOOKS_KEY, "hook")?,
            transformers: parse_list(props, TRANSFORMERS_KEY, "representation transformer")?,
            checkers: parse_list(props, CHECKERS_KEY, "checker")?,
        })
    }

    /// Checks the declarations in `props` without keeping them.
    pub fn validate(props: &Value) -> GateResult<()> {
        Self::from_props(props).map(|_| ())
    }

    /// Returns the transformers of one phase.
    pub fn transformers_for(&self, phase: Phase) -> impl Iterator<Item = &TransformerDeclaration> {
        self.transformers.iter().filter(move |t| t.phase == phase)
    }

    /// Returns `true` when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty() && self.transformers.is_empty() && self.checkers.is_empty()
    }
}

fn parse_list<T: DeserializeOwned>(props: &Value, key: &str, what: &str) -> GateResult<Vec<T>> {
    let Some(value) = props.get(key) else {
        return Ok(Vec::new());
    };
    let items = match value {
        Value::Array(items) => items.clone(),
        // a single declaration is accepted as a one element list
        Value::Object(_) => vec![value.clone()],
        _ => {
            return Err(GateError::not_acceptable(format!(
                "wrong {what} definition. '{key}' must be an array"
            )))
        }
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|err| GateError::not_acceptable(format!("wrong {what} definition. {err}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_parses_all_declarations() {
        let props = json!({
            "hooks": [{"name": "snooper"}],
            "rts": [{"name": "t", "phase": "RESPONSE", "scope": "CHILDREN", "args": {"a": 1}}],
            "checkers": {"name": "checkContentSize", "args": {"max": 10}, "skipNotSupported": true}
        });
        let metadata = ResourceMetadata::from_props(&props).unwrap();

        assert_eq!(metadata.hooks[0].name, "snooper");
        assert_eq!(metadata.hooks[0].args, Value::Null);
        assert_eq!(metadata.transformers[0].scope, Scope::Children);
        assert_eq!(metadata.transformers_for(Phase::Request).count(), 0);
        assert_eq!(metadata.transformers_for(Phase::Response).count(), 1);
        assert!(metadata.checkers[0].skip_not_supported);
    }

    #[test]
    fn test_absent_keys_are_empty() {
        let metadata = ResourceMetadata::from_props(&json!({"description": "x"})).unwrap();
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_malformed_declarations_are_not_acceptable() {
        let err = ResourceMetadata::validate(&json!({"rts": [{"name": "t"}]})).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_ACCEPTABLE);
        assert!(err
            .message()
            .starts_with("wrong representation transformer definition."));

        let err = ResourceMetadata::validate(&json!({"checkers": "nope"})).unwrap_err();
        assert!(err.message().starts_with("wrong checker definition."));

        let err = ResourceMetadata::validate(&json!({"hooks": [{"nome": "x"}]})).unwrap_err();
        assert!(err.message().starts_with("wrong hook definition."));
    }
}
