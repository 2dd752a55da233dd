//! Startup: configuration to registry to pipeline to server.

use docgate_config::DocgateConfig;
use docgate_core::plugin::{
    PluginDescriptor, PluginKind, PluginRegistry, PluginSettings, StaticDiscovery,
};
use docgate_core::{Container, DataAccess, GateError, GateResult, MetadataCache};
use docgate_data::{builtin_descriptors, DocumentService, LoadingCache, MemoryStore};
use docgate_pipeline::interceptors::TokenCorsResponseInterceptor;
use docgate_pipeline::Pipeline;
use docgate_server::{Server, ServerError, ShutdownSignal};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// A bootstrapped gateway: a sealed registry and the pipeline over it.
#[derive(Debug)]
pub struct Docgate {
    config: DocgateConfig,
    registry: Arc<PluginRegistry>,
    pipeline: Arc<Pipeline>,
}

impl Docgate {
    /// Starts building a gateway from a loaded configuration.
    pub fn builder(config: DocgateConfig) -> DocgateBuilder {
        DocgateBuilder::new(config)
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &DocgateConfig {
        &self.config
    }

    /// Returns the sealed plugin registry.
    pub const fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Returns the pipeline.
    pub const fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Returns the transport settings.
    pub fn server_config(&self) -> docgate_server::ServerConfig {
        let server = &self.config.server;
        docgate_server::ServerConfig {
            http_addr: server.http_addr.clone(),
            shutdown_timeout: Duration::from_secs(server.shutdown_timeout_secs),
            request_timeout: Duration::from_millis(server.request_timeout_ms),
            max_body_bytes: server.max_body_bytes,
        }
    }

    /// Serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let server = Server::new(self.server_config(), Arc::clone(&self.pipeline));
        server.run_with_shutdown(shutdown).await
    }
}

/// Builds a [`Docgate`].
///
/// Without [`DocgateBuilder::with_data`] the gateway runs over a fresh
/// [`MemoryStore`].
pub struct DocgateBuilder {
    config: DocgateConfig,
    container: Container,
    descriptors: Vec<PluginDescriptor>,
    data: Option<Arc<dyn DataAccess>>,
}

impl DocgateBuilder {
    fn new(config: DocgateConfig) -> Self {
        let mut descriptors = builtin_descriptors();
        descriptors.push(TokenCorsResponseInterceptor::descriptor());
        Self {
            config,
            container: Container::new(),
            descriptors,
            data: None,
        }
    }

    /// Uses `data` as the data-access collaborator.
    #[must_use]
    pub fn with_data(mut self, data: Arc<dyn DataAccess>) -> Self {
        self.data = Some(data);
        self
    }

    /// Registers a collaborator plugin factories can require.
    #[must_use]
    pub fn with_collaborator<T>(mut self, collaborator: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.container.register(collaborator);
        self
    }

    /// Adds a plugin next to the built-in ones.
    #[must_use]
    pub fn with_plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Discovers and instantiates the plugins, runs the initializers, seals the
    /// registry and builds the standard pipeline.
    ///
    /// Fails when a configured plugin is unknown, an enabled plugin cannot be
    /// created, or two services share a mount.
    pub fn build(self) -> GateResult<Docgate> {
        let Self {
            config,
            mut container,
            descriptors,
            data,
        } = self;

        let data = data.unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn DataAccess>);
        if !container.contains::<dyn MetadataCache>() {
            let cache: Arc<dyn MetadataCache> = Arc::new(LoadingCache::new(Arc::clone(&data)));
            container.register(cache);
        }
        container.register(data);

        let settings = plugin_settings(&config, &descriptors)?;
        let mut discovery = StaticDiscovery::new(container);
        for descriptor in descriptors {
            discovery.register(descriptor);
        }
        for (name, settings) in settings {
            discovery = discovery.with_settings(name, settings);
        }

        let registry = Arc::new(PluginRegistry::new(Arc::new(discovery)));
        registry.instantiate_all()?;
        registry.run_initializers()?;
        registry.seal();

        let pipeline = Pipeline::standard(Arc::clone(&registry))?;
        let services: Vec<String> = registry
            .enabled(PluginKind::Service)?
            .iter()
            .map(|record| record.name().to_string())
            .collect();
        tracing::info!(
            services = ?services,
            stages = pipeline.stage_count(),
            "docgate bootstrapped"
        );

        Ok(Docgate {
            config,
            registry,
            pipeline: Arc::new(pipeline),
        })
    }
}

impl std::fmt::Debug for DocgateBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocgateBuilder")
            .field("plugins", &self.descriptors.len())
            .finish_non_exhaustive()
    }
}

/// Resolves configured plugin names against the known descriptors and folds
/// the `[data]` section into the document service arguments.
fn plugin_settings(
    config: &DocgateConfig,
    descriptors: &[PluginDescriptor],
) -> GateResult<Vec<(String, PluginSettings)>> {
    let mut resolved: Vec<(String, PluginSettings)> = Vec::new();

    // Names from environment overrides lose their case.
    for (configured, settings) in config.plugin_settings() {
        let name = descriptors
            .iter()
            .map(PluginDescriptor::name)
            .find(|name| name.eq_ignore_ascii_case(configured))
            .ok_or_else(|| {
                GateError::configuration(format!("unknown plugin '{configured}' in configuration"))
            })?;
        resolved.push((name.to_string(), settings));
    }

    let index = match resolved.iter().position(|(name, _)| name == DocumentService::NAME) {
        Some(index) => index,
        None => {
            resolved.push((DocumentService::NAME.to_string(), PluginSettings::default()));
            resolved.len() - 1
        }
    };
    let documents = &mut resolved[index].1;
    let mut args = match std::mem::take(&mut documents.args) {
        Value::Object(args) => args,
        _ => Map::new(),
    };
    args.entry("default_pagesize")
        .or_insert_with(|| Value::from(config.data.default_pagesize));
    args.entry("max_pagesize")
        .or_insert_with(|| Value::from(config.data.max_pagesize));
    documents.args = Value::Object(args);

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_config::PluginConfig;
    use serde_json::json;

    #[test]
    fn test_data_section_becomes_document_args() {
        let mut config = DocgateConfig::default();
        config.data.default_pagesize = 7;

        let settings = plugin_settings(&config, &builtin_descriptors()).unwrap();
        let (_, documents) = settings
            .iter()
            .find(|(name, _)| name == "documents")
            .unwrap();
        assert_eq!(documents.args["default_pagesize"], 7);
        assert_eq!(documents.args["max_pagesize"], 1000);
    }

    #[test]
    fn test_explicit_args_win() {
        let mut config = DocgateConfig::default();
        config.plugins.insert(
            "documents".to_string(),
            PluginConfig {
                args: json!({"max_pagesize": 50}),
                ..PluginConfig::default()
            },
        );

        let settings = plugin_settings(&config, &builtin_descriptors()).unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].1.args["max_pagesize"], 50);
        assert_eq!(settings[0].1.args["default_pagesize"], 100);
    }

    #[test]
    fn test_names_match_without_case() {
        let mut config = DocgateConfig::default();
        config.plugins.insert(
            "checkcontentsize".to_string(),
            PluginConfig {
                enabled: Some(false),
                ..PluginConfig::default()
            },
        );

        let settings = plugin_settings(&config, &builtin_descriptors()).unwrap();
        assert!(settings
            .iter()
            .any(|(name, s)| name == "checkContentSize" && s.enabled == Some(false)));
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        let mut config = DocgateConfig::default();
        config
            .plugins
            .insert("nonesuch".to_string(), PluginConfig::default());

        let err = plugin_settings(&config, &builtin_descriptors()).unwrap_err();
        assert!(err.to_string().contains("nonesuch"));
    }

    #[test]
    fn test_build_seals_registry() {
        let gate = Docgate::builder(DocgateConfig::default()).build().unwrap();
        assert!(gate.registry().is_sealed());
        assert_eq!(gate.server_config().request_timeout, Duration::from_secs(30));
    }
}
