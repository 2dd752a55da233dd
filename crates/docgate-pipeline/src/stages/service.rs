//! Service invocation.

use super::SELECTED_SERVICE;
use crate::stage::{fail, Flow, Stage};
use docgate_core::plugin::PluginKind;
use docgate_core::{BoxFuture, Exchange, GateError};
use docgate_telemetry::metrics::record_plugin_failure;

/// Invokes the service selected by the routing stage.
///
/// A service error puts the response in error; the response interception
/// point still runs afterwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceStage;

impl Stage for ServiceStage {
    fn name(&self) -> &'static str {
        "service"
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            if exchange.is_completed() {
                return Flow::Continue;
            }
            let Some(record) = exchange.attachments().get(&SELECTED_SERVICE).cloned() else {
                return fail(exchange, &GateError::internal("no service selected"));
            };
            let Some(service) = record.as_service() else {
                return fail(exchange, &GateError::internal("selected plugin is not a service"));
            };

            if let Err(err) = service.handle(exchange).await {
                if err.status_code().is_server_error() {
                    tracing::error!(service = record.name(), error = %err, "service failed");
                    record_plugin_failure(PluginKind::Service.name(), record.name());
                } else {
                    tracing::debug!(service = record.name(), error = %err, "service rejected request");
                }
                exchange.response_mut().set_error(&err);
            }
            Flow::Continue
        })
    }
}
