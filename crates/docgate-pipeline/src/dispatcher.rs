//! The interception dispatcher.
//!
//! For one [`InterceptPoint`] the dispatcher runs, in this order:
//!
//! 1. global interceptors declared for the point
//! 2. registered interceptors declared for the point, in discovery order
//! 3. at `BeforeHandler` / `Response`: global, then metadata-declared transformers
//! 4. at `BeforeHandler`, on writes: global, then metadata-declared checkers
//! 5. at `ResponseAsync`: global, then metadata-declared hooks
//!
//! Each plugin runs only if its predicate resolves for the exchange.
//!
//! Failure policy per kind:
//!
//! | Kind | On error |
//! |------|----------|
//! | Interceptor | response in error, rest of the point skipped |
//! | Transformer | response in error, rest of the point skipped |
//! | Checker | rejection or error aborts the request before the service runs |
//! | Hook | logged and turned into a warning, other hooks still run |
//!
//! A plugin named in resource metadata but not registered is skipped with a
//! warning on the response.

use crate::stage::Flow;
use docgate_core::plugin::{
    Checker, InterceptPoint, Phase, PluginArgs, PluginKind, PluginRecord, PluginRegistry,
    ResourceMetadata, Scope, Transformer,
};
use docgate_core::{Exchange, GateError, GateResult};
use docgate_telemetry::metrics::record_plugin_failure;
use http::Method;
use serde_json::Value;
use std::sync::Arc;

/// Runs the plugins applying to one intercept point.
#[derive(Debug, Clone)]
pub struct InterceptionDispatcher {
    registry: Arc<PluginRegistry>,
}

impl InterceptionDispatcher {
    /// Creates a dispatcher over a registry.
    #[must_use]
    pub const fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    pub const fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Runs the plugins for `point`.
    ///
    /// Returns [`Flow::Terminate`] when a request point leaves the response in
    /// error, so the service never runs.
    pub async fn dispatch(&self, point: InterceptPoint, exchange: &mut Exchange) -> Flow {
        if point == InterceptPoint::ResponseAsync {
            self.dispatch_async(exchange).await;
            return Flow::Continue;
        }
        if exchange.is_completed() {
            tracing::debug!(%point, "exchange already completed, interception skipped");
            return Flow::Continue;
        }

        match self.run(point, exchange).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Terminate) => return Flow::Terminate,
            Err(err) => {
                exchange.response_mut().set_error(&err);
                return if point.is_request() {
                    Flow::Terminate
                } else {
                    Flow::Continue
                };
            }
        }

        if point.is_request() && exchange.is_in_error() {
            Flow::Terminate
        } else {
            Flow::Continue
        }
    }

    async fn run(&self, point: InterceptPoint, exchange: &mut Exchange) -> GateResult<Flow> {
        if self.run_interceptors(point, exchange).await?.is_terminate() {
            return Ok(Flow::Terminate);
        }

        if let Some(phase) = point.phase() {
            let metadata = self.resource_metadata(exchange);
            self.run_transformers(phase, exchange, metadata.as_ref())?;
            if phase == Phase::Request {
                self.run_checkers(exchange, metadata.as_ref())?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_interceptors(
        &self,
        point: InterceptPoint,
        exchange: &mut Exchange,
    ) -> GateResult<Flow> {
        for global in self.registry.global_interceptors() {
            let interceptor = global.interceptor();
            if interceptor.intercept_point() != point || !interceptor.resolve(exchange) {
                continue;
            }
            tracing::debug!(interceptor = global.name(), %point, "running global interceptor");
            interceptor
                .handle(exchange)
                .await
                .map_err(|err| plugin_failed(PluginKind::Interceptor, global.name(), err))?;
            if point.is_request() && exchange.is_in_error() {
                return Ok(Flow::Terminate);
            }
        }

        for record in self.registry.enabled(PluginKind::Interceptor)? {
            let Some(interceptor) = record.as_interceptor() else {
                continue;
            };
            if interceptor.intercept_point() != point || !interceptor.resolve(exchange) {
                continue;
            }
            tracing::debug!(interceptor = record.name(), %point, "running interceptor");
            interceptor
                .handle(exchange)
                .await
                .map_err(|err| plugin_failed(PluginKind::Interceptor, record.name(), err))?;
            if point.is_request() && exchange.is_in_error() {
                return Ok(Flow::Terminate);
            }
        }

        Ok(Flow::Continue)
    }

    fn run_transformers(
        &self,
        phase: Phase,
        exchange: &mut Exchange,
        metadata: Option<&ResourceMetadata>,
    ) -> GateResult<()> {
        for global in self.registry.global_transformers() {
            if global.phase() != phase || !global.resolve(exchange) {
                continue;
            }
            apply_transformer(
                exchange,
                phase,
                global.scope(),
                global.name(),
                global.transformer().as_ref(),
                global.args(),
            )?;
        }

        let Some(metadata) = metadata else {
            return Ok(());
        };
        for declaration in metadata.transformers_for(phase) {
            let Some(record) = self.lookup(PluginKind::Transformer, &declaration.name, exchange)
            else {
                continue;
            };
            let Some(transformer) = record.as_transformer() else {
                continue;
            };
            let args = PluginArgs::new(declaration.args.clone(), record.conf_args().clone());
            apply_transformer(
                exchange,
                phase,
                declaration.scope,
                record.name(),
                transformer.as_ref(),
                &args,
            )?;
        }
        Ok(())
    }

    fn run_checkers(
        &self,
        exchange: &mut Exchange,
        metadata: Option<&ResourceMetadata>,
    ) -> GateResult<()> {
        let request = exchange.request();
        if !request.is_write() || request.method() == Method::DELETE || request.content().is_none()
        {
            return Ok(());
        }

        for global in self.registry.global_checkers() {
            if !global.resolve(exchange) {
                continue;
            }
            run_checker(
                exchange,
                global.name(),
                global.checker().as_ref(),
                global.args(),
                global.skips_not_supported(),
            )?;
        }

        let Some(metadata) = metadata else {
            return Ok(());
        };
        for declaration in &metadata.checkers {
            let Some(record) = self.lookup(PluginKind::Checker, &declaration.name, exchange)
            else {
                continue;
            };
            let Some(checker) = record.as_checker() else {
                continue;
            };
            let args = PluginArgs::new(declaration.args.clone(), record.conf_args().clone());
            run_checker(
                exchange,
                record.name(),
                checker.as_ref(),
                &args,
                declaration.skip_not_supported,
            )?;
        }
        Ok(())
    }

    /// Runs the `ResponseAsync` point: interceptors, then hooks.
    ///
    /// Failures are logged and recorded as warnings; nothing here can change
    /// what the client received.
    pub async fn dispatch_async(&self, exchange: &mut Exchange) {
        let point = InterceptPoint::ResponseAsync;

        for global in self.registry.global_interceptors() {
            let interceptor = global.interceptor();
            if interceptor.intercept_point() != point || !interceptor.resolve(exchange) {
                continue;
            }
            if let Err(err) = interceptor.handle(exchange).await {
                let err = plugin_failed(PluginKind::Interceptor, global.name(), err);
                exchange.response_mut().add_warning(err.to_string());
            }
        }

        match self.registry.enabled(PluginKind::Interceptor) {
            Ok(records) => {
                for record in records {
                    let Some(interceptor) = record.as_interceptor() else {
                        continue;
                    };
                    if interceptor.intercept_point() != point || !interceptor.resolve(exchange) {
                        continue;
                    }
                    if let Err(err) = interceptor.handle(exchange).await {
                        let err = plugin_failed(PluginKind::Interceptor, record.name(), err);
                        exchange.response_mut().add_warning(err.to_string());
                    }
                }
            }
            Err(err) => tracing::error!(error = %err, "cannot list interceptors"),
        }

        for global in self.registry.global_hooks() {
            if !global.resolve(exchange) || !global.hook().supports(exchange) {
                continue;
            }
            tracing::debug!(hook = global.name(), "running global hook");
            if let Err(err) = global.hook().hook(exchange, global.args()).await {
                hook_failed(exchange, global.name(), &err);
            }
        }

        let Some(metadata) = self.resource_metadata(exchange) else {
            return;
        };
        for declaration in &metadata.hooks {
            let Some(record) = self.lookup(PluginKind::Hook, &declaration.name, exchange) else {
                continue;
            };
            let Some(hook) = record.as_hook() else {
                continue;
            };
            if !hook.supports(exchange) {
                continue;
            }
            let args = PluginArgs::new(declaration.args.clone(), record.conf_args().clone());
            tracing::debug!(hook = record.name(), "running hook");
            if let Err(err) = hook.hook(exchange, &args).await {
                hook_failed(exchange, record.name(), &err);
            }
        }
    }

    fn resource_metadata(&self, exchange: &mut Exchange) -> Option<ResourceMetadata> {
        let props = exchange.request().collection_props()?;
        match ResourceMetadata::from_props(props) {
            Ok(metadata) if metadata.is_empty() => None,
            Ok(metadata) => Some(metadata),
            Err(err) => {
                let warning = format!("invalid resource metadata: {err}");
                // evaluated once per phase, reported once
                if !exchange.response().warnings().contains(&warning) {
                    tracing::warn!(error = %err, "invalid resource metadata, declared plugins skipped");
                    exchange.response_mut().add_warning(warning);
                }
                None
            }
        }
    }

    fn lookup(
        &self,
        kind: PluginKind,
        name: &str,
        exchange: &mut Exchange,
    ) -> Option<Arc<PluginRecord>> {
        match self.registry.by_name(kind, name) {
            Ok(record) if record.is_enabled() => Some(record),
            Ok(_) => {
                tracing::warn!(%kind, plugin = name, "{kind} set to apply but disabled");
                exchange
                    .response_mut()
                    .add_warning(format!("{kind} '{name}' set to apply but disabled"));
                None
            }
            Err(_) => {
                tracing::warn!(%kind, plugin = name, "{kind} set to apply but not registered");
                exchange
                    .response_mut()
                    .add_warning(format!("{kind} '{name}' set to apply but not registered"));
                None
            }
        }
    }
}

fn apply_transformer(
    exchange: &mut Exchange,
    phase: Phase,
    scope: Scope,
    name: &str,
    transformer: &dyn Transformer,
    args: &PluginArgs,
) -> GateResult<()> {
    let (request, response, _) = exchange.parts_mut();
    let result = match phase {
        Phase::Request => {
            // the request view is lent to the transformer while its content is out
            let Some(mut content) = request.take_content() else {
                return Ok(());
            };
            let result = transformer.transform(request, &mut content, args);
            request.set_content(content);
            result
        }
        Phase::Response => {
            if response.is_in_error() {
                return Ok(());
            }
            let Some(content) = response.content_mut() else {
                return Ok(());
            };
            match scope {
                Scope::This => transformer.transform(request, content, args),
                Scope::Children => match content.get_mut("_embedded").and_then(Value::as_array_mut)
                {
                    Some(children) => children
                        .iter_mut()
                        .try_for_each(|child| transformer.transform(request, child, args)),
                    None => Ok(()),
                },
            }
        }
    };
    tracing::debug!(transformer = name, ?phase, ok = result.is_ok(), "transformer applied");
    result.map_err(|err| plugin_failed(PluginKind::Transformer, name, err))
}

fn run_checker(
    exchange: &Exchange,
    name: &str,
    checker: &dyn Checker,
    args: &PluginArgs,
    skip_not_supported: bool,
) -> GateResult<()> {
    let request = exchange.request();
    let Some(content) = request.content() else {
        return Ok(());
    };

    if !checker.supports(request) {
        if skip_not_supported {
            tracing::debug!(checker = name, "checker does not support request, skipped");
            return Ok(());
        }
        return Err(GateError::bad_request(format!(
            "checker '{name}' does not support this request"
        )));
    }

    match checker.check(request, content, args) {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::debug!(checker = name, "request check failed");
            Err(GateError::bad_request(format!(
                "request check failed: checker '{name}' rejected the content"
            )))
        }
        Err(err) => Err(plugin_failed(PluginKind::Checker, name, err)),
    }
}

fn plugin_failed(kind: PluginKind, name: &str, err: GateError) -> GateError {
    tracing::warn!(%kind, plugin = name, error = %err, "plugin failed");
    record_plugin_failure(kind.name(), name);
    err
}

fn hook_failed(exchange: &mut Exchange, name: &str, err: &GateError) {
    tracing::error!(hook = name, error = %err, "Error executing hook '{name}': {}", err.message());
    record_plugin_failure(PluginKind::Hook.name(), name);
    exchange
        .response_mut()
        .add_warning(format!("Error executing hook '{name}': {}", err.message()));
}
