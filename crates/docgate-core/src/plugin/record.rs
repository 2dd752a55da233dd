//! Plugin records.

use super::kind::{InterceptPoint, PluginKind};
use super::traits::{
    AuthMechanism, Authenticator, Authorizer, Checker, Hook, Initializer, Interceptor, Service,
    TokenManager, Transformer,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A plugin instance, tagged by kind.
#[derive(Clone)]
pub enum PluginInstance {
    /// A service.
    Service(Arc<dyn Service>),
    /// An interceptor.
    Interceptor(Arc<dyn Interceptor>),
    /// A hook.
    Hook(Arc<dyn Hook>),
    /// A transformer.
    Transformer(Arc<dyn Transformer>),
    /// A checker.
    Checker(Arc<dyn Checker>),
    /// An authenticator.
    Authenticator(Arc<dyn Authenticator>),
    /// An authorizer.
    Authorizer(Arc<dyn Authorizer>),
    /// An auth mechanism.
    AuthMechanism(Arc<dyn AuthMechanism>),
    /// A token manager.
    TokenManager(Arc<dyn TokenManager>),
    /// An initializer.
    Initializer(Arc<dyn Initializer>),
}

impl PluginInstance {
    /// Returns the kind of this instance.
    #[must_use]
    pub const fn kind(&self) -> PluginKind {
        match self {
            Self::Service(_) => PluginKind::Service,
            Self::Interceptor(_) => PluginKind::Interceptor,
            Self::Hook(_) => PluginKind::Hook,
            Self::Transformer(_) => PluginKind::Transformer,
            Self::Checker(_) => PluginKind::Checker,
            Self::Authenticator(_) => PluginKind::Authenticator,
            Self::Authorizer(_) => PluginKind::Authorizer,
            Self::AuthMechanism(_) => PluginKind::AuthMechanism,
            Self::TokenManager(_) => PluginKind::TokenManager,
            Self::Initializer(_) => PluginKind::Initializer,
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginInstance").field(&self.kind()).finish()
    }
}

/// Arguments handed to a hook, transformer or checker invocation.
///
/// `args` come from the resource metadata or the global registration,
/// `conf_args` from the plugin configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginArgs {
    /// Per-invocation arguments.
    pub args: Value,
    /// Configuration arguments of the plugin.
    pub conf_args: Value,
}

impl PluginArgs {
    /// Creates plugin arguments.
    #[must_use]
    pub const fn new(args: Value, conf_args: Value) -> Self {
        Self { args, conf_args }
    }

    /// Looks up a key in `args`, then in `conf_args`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.args.get(key).or_else(|| self.conf_args.get(key))
    }
}

/// A discovered plugin: its name, configuration and instance.
///
/// Records are immutable once discovered and shared as `Arc<PluginRecord>`.
#[derive(Debug, Clone)]
pub struct PluginRecord {
    name: String,
    description: String,
    enabled: bool,
    conf_args: Value,
    instance: PluginInstance,
}

impl PluginRecord {
    /// Creates an enabled record with no configuration.
    pub fn new(name: impl Into<String>, instance: PluginInstance) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            conf_args: Value::Null,
            instance,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the configuration arguments.
    #[must_use]
    pub fn with_conf_args(mut self, conf_args: Value) -> Self {
        self.conf_args = conf_args;
        self
    }

    /// Enables or disables the plugin.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the plugin name, unique within its kind.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the kind.
    pub const fn kind(&self) -> PluginKind {
        self.instance.kind()
    }

    /// Returns `true` when the plugin is enabled.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the configuration arguments.
    pub const fn conf_args(&self) -> &Value {
        &self.conf_args
    }

    /// Returns the instance.
    pub const fn instance(&self) -> &PluginInstance {
        &self.instance
    }

    /// Returns the mount point of a service: the configured `uri`, the
    /// service default or `/<name>`.
    pub fn mount_uri(&self) -> Option<String> {
        let PluginInstance::Service(service) = &self.instance else {
            return None;
        };
        let uri = self
            .conf_args
            .get("uri")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .or_else(|| service.default_uri().map(ToString::to_string))
            .unwrap_or_else(|| format!("/{}", self.name));
        Some(uri)
    }

    /// Returns the intercept point of an interceptor.
    pub fn intercept_point(&self) -> Option<InterceptPoint> {
        match &self.instance {
            PluginInstance::Interceptor(interceptor) => Some(interceptor.intercept_point()),
            _ => None,
        }
    }

    /// Returns the service instance, if this is a service.
    pub fn as_service(&self) -> Option<&Arc<dyn Service>> {
        match &self.instance {
            PluginInstance::Service(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the interceptor instance, if this is an interceptor.
    pub fn as_interceptor(&self) -> Option<&Arc<dyn Interceptor>> {
        match &self.instance {
            PluginInstance::Interceptor(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the hook instance, if this is a hook.
    pub fn as_hook(&self) -> Option<&Arc<dyn Hook>> {
        match &self.instance {
            PluginInstance::Hook(h) => Some(h),
            _ => None,
        }
    }

    /// Returns the transformer instance, if this is a transformer.
    pub fn as_transformer(&self) -> Option<&Arc<dyn Transformer>> {
        match &self.instance {
            PluginInstance::Transformer(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the checker instance, if this is a checker.
    pub fn as_checker(&self) -> Option<&Arc<dyn Checker>> {
        match &self.instance {
            PluginInstance::Checker(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the authenticator instance, if this is an authenticator.
    pub fn as_authenticator(&self) -> Option<&Arc<dyn Authenticator>> {
        match &self.instance {
            PluginInstance::Authenticator(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the authorizer instance, if this is an authorizer.
    pub fn as_authorizer(&self) -> Option<&Arc<dyn Authorizer>> {
        match &self.instance {
            PluginInstance::Authorizer(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the auth mechanism instance, if this is an auth mechanism.
    pub fn as_auth_mechanism(&self) -> Option<&Arc<dyn AuthMechanism>> {
        match &self.instance {
            PluginInstance::AuthMechanism(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the token manager instance, if this is a token manager.
    pub fn as_token_manager(&self) -> Option<&Arc<dyn TokenManager>> {
        match &self.instance {
            PluginInstance::TokenManager(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the initializer instance, if this is an initializer.
    pub fn as_initializer(&self) -> Option<&Arc<dyn Initializer>> {
        match &self.instance {
            PluginInstance::Initializer(i) => Some(i),
            _ => None,
        }
    }
}
