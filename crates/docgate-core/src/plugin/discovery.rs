//! Plugin discovery.
//!
//! The registry asks a [`PluginDiscovery`] for the plugins of one kind the
//! first time that kind is needed. [`StaticDiscovery`] is the built-in
//! implementation: plugins are declared up front as [`PluginDescriptor`]s and
//! instantiated with their configured arguments and the shared [`Container`].

use super::kind::PluginKind;
use super::record::{PluginInstance, PluginRecord};
use super::traits::{
    AuthMechanism, Authenticator, Authorizer, Checker, Hook, Initializer, Interceptor, Service,
    TokenManager, Transformer,
};
use crate::di::Container;
use crate::error::{GateError, GateResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Source of plugin records.
pub trait PluginDiscovery: Send + Sync + 'static {
    /// Returns the plugins of one kind, in declaration order.
    ///
    /// Called at most once per kind by the registry.
    fn discover(&self, kind: PluginKind) -> GateResult<Vec<PluginRecord>>;
}

/// What a plugin factory sees while building its instance.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    name: &'a str,
    conf_args: &'a Value,
    container: &'a Container,
}

impl<'a> PluginContext<'a> {
    /// Creates a context.
    #[must_use]
    pub const fn new(name: &'a str, conf_args: &'a Value, container: &'a Container) -> Self {
        Self {
            name,
            conf_args,
            container,
        }
    }

    /// Returns the plugin name.
    pub const fn name(&self) -> &'a str {
        self.name
    }

    /// Returns the configuration arguments.
    pub const fn conf_args(&self) -> &'a Value {
        self.conf_args
    }

    /// Returns the collaborator container.
    pub const fn container(&self) -> &'a Container {
        self.container
    }

    /// Returns a required collaborator.
    pub fn require<T>(&self) -> GateResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.require::<T>().map_err(|err| {
            GateError::configuration(format!("plugin '{}': {}", self.name, err.message()))
        })
    }

    /// Deserializes one configuration argument.
    pub fn arg<T: DeserializeOwned>(&self, key: &str) -> GateResult<Option<T>> {
        match self.conf_args.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|err| {
                GateError::configuration(format!(
                    "plugin '{}': invalid argument '{key}': {err}",
                    self.name
                ))
            }),
        }
    }
}

/// Builds a plugin instance from its context.
pub type PluginFactory =
    Arc<dyn Fn(&PluginContext<'_>) -> GateResult<PluginInstance> + Send + Sync>;

/// A plugin declaration: name, kind and factory.
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    kind: PluginKind,
    description: String,
    enabled_by_default: bool,
    factory: PluginFactory,
}

macro_rules! typed_constructor {
    ($(#[$doc:meta])* $fn_name:ident, $trait_name:ident, $variant:ident) => {
        $(#[$doc])*
        pub fn $fn_name<F, P>(name: impl Into<String>, factory: F) -> Self
        where
            F: Fn(&PluginContext<'_>) -> GateResult<P> + Send + Sync + 'static,
            P: $trait_name,
        {
            Self::new(name, PluginKind::$variant, move |ctx| {
                Ok(PluginInstance::$variant(Arc::new(factory(ctx)?)))
            })
        }
    };
}

impl PluginDescriptor {
    /// Creates a descriptor, enabled by default.
    pub fn new<F>(name: impl Into<String>, kind: PluginKind, factory: F) -> Self
    where
        F: Fn(&PluginContext<'_>) -> GateResult<PluginInstance> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            enabled_by_default: true,
            factory: Arc::new(factory),
        }
    }

    typed_constructor!(
        /// Declares a service.
        service, Service, Service
    );
    typed_constructor!(
        /// Declares an interceptor.
        interceptor, Interceptor, Interceptor
    );
    typed_constructor!(
        /// Declares a hook.
        hook, Hook, Hook
    );
    typed_constructor!(
        /// Declares a transformer.
        transformer, Transformer, Transformer
    );
    typed_constructor!(
        /// Declares a checker.
        checker, Checker, Checker
    );
    typed_constructor!(
        /// Declares an authenticator.
        authenticator, Authenticator, Authenticator
    );
    typed_constructor!(
        /// Declares an authorizer.
        authorizer, Authorizer, Authorizer
    );
    typed_constructor!(
        /// Declares an auth mechanism.
        auth_mechanism, AuthMechanism, AuthMechanism
    );
    typed_constructor!(
        /// Declares a token manager.
        token_manager, TokenManager, TokenManager
    );
    typed_constructor!(
        /// Declares an initializer.
        initializer, Initializer, Initializer
    );

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Makes the plugin opt-in: it stays disabled unless configured `enabled = true`.
    #[must_use]
    pub fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind.
    pub const fn kind(&self) -> PluginKind {
        self.kind
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("enabled_by_default", &self.enabled_by_default)
            .finish_non_exhaustive()
    }
}

/// Configured overrides for one plugin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginSettings {
    /// Overrides the descriptor's default enablement.
    pub enabled: Option<bool>,
    /// Mount point of a service.
    pub uri: Option<String>,
    /// Configuration arguments.
    pub args: Value,
}

impl PluginSettings {
    fn conf_args(&self) -> Value {
        let mut args = match &self.args {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        if let (Some(uri), Some(map)) = (&self.uri, args.as_object_mut()) {
            map.insert("uri".to_string(), Value::String(uri.clone()));
        }
        args
    }
}

/// Discovery over a fixed list of descriptors.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    descriptors: Vec<PluginDescriptor>,
    settings: HashMap<String, PluginSettings>,
    container: Container,
}

impl StaticDiscovery {
    /// Creates a discovery instantiating plugins against `container`.
    #[must_use]
    pub fn new(container: Container) -> Self {
        Self {
            descriptors: Vec::new(),
            settings: HashMap::new(),
            container,
        }
    }

    /// Adds a descriptor.
    #[must_use]
    pub fn with(mut self, descriptor: PluginDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Adds a descriptor.
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Sets the overrides for the plugin named `name`.
    #[must_use]
    pub fn with_settings(mut self, name: impl Into<String>, settings: PluginSettings) -> Self {
        self.settings.insert(name.into(), settings);
        self
    }

    /// Returns configured names that match no descriptor.
    pub fn unknown_settings(&self) -> Vec<&str> {
        let mut unknown: Vec<&str> = self
            .settings
            .keys()
            .filter(|name| !self.descriptors.iter().any(|d| &d.name == *name))
            .map(String::as_str)
            .collect();
        unknown.sort_unstable();
        unknown
    }

    /// Returns the collaborator container.
    pub const fn container(&self) -> &Container {
        &self.container
    }
}

impl PluginDiscovery for StaticDiscovery {
    fn discover(&self, kind: PluginKind) -> GateResult<Vec<PluginRecord>> {
        let mut records = Vec::new();

        for descriptor in self.descriptors.iter().filter(|d| d.kind == kind) {
            let settings = self.settings.get(&descriptor.name);
            let enabled = settings
                .and_then(|s| s.enabled)
                .unwrap_or(descriptor.enabled_by_default);
            let conf_args = settings.map_or(Value::Null, PluginSettings::conf_args);
            let ctx = PluginContext::new(&descriptor.name, &conf_args, &self.container);

            match (descriptor.factory)(&ctx) {
                Ok(instance) if instance.kind() != kind => {
                    return Err(GateError::configuration(format!(
                        "plugin '{}' declared as {kind} but built as {}",
                        descriptor.name,
                        instance.kind()
                    )));
                }
                Ok(instance) => {
                    records.push(
                        PluginRecord::new(descriptor.name.clone(), instance)
                            .with_description(descriptor.description.clone())
                            .with_conf_args(conf_args)
                            .with_enabled(enabled),
                    );
                }
                Err(err) if !enabled => {
                    tracing::debug!(
                        plugin = %descriptor.name,
                        %kind,
                        error = %err,
                        "skipping disabled plugin that failed to instantiate"
                    );
                }
                Err(err) => {
                    return Err(GateError::configuration(format!(
                        "cannot instantiate {kind} '{}': {err}",
                        descriptor.name
                    )));
                }
            }
        }

        Ok(records)
    }
}
