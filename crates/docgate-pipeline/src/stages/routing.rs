//! Service selection.

use super::SELECTED_SERVICE;
use crate::router::ServiceRouter;
use crate::stage::{fail, Flow, Stage};
use docgate_core::{BoxFuture, Exchange, GateError, MdcContext, MDC_CONTEXT};
use docgate_telemetry::fields;
use std::sync::Arc;

/// Selects the service for a request and runs its request initializer.
///
/// Responds 404 before any service code runs when no mount matches.
#[derive(Debug)]
pub struct RoutingStage {
    router: ServiceRouter,
}

impl RoutingStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new(router: ServiceRouter) -> Self {
        Self { router }
    }

    /// Returns the router.
    pub const fn router(&self) -> &ServiceRouter {
        &self.router
    }
}

impl Stage for RoutingStage {
    fn name(&self) -> &'static str {
        "routing"
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let path = exchange.request().path().to_string();
            let Some(route) = self.router.resolve(&path) else {
                return fail(
                    exchange,
                    &GateError::not_found(format!("no service mounted for '{path}'")),
                );
            };
            let record = Arc::clone(route.record());
            let Some(service) = record.as_service().cloned() else {
                return fail(
                    exchange,
                    &GateError::internal(format!("'{}' is not a service", record.name())),
                );
            };

            exchange
                .request_mut()
                .set_service(record.name(), route.mount());
            if !service.resolve(exchange) {
                return fail(
                    exchange,
                    &GateError::not_found(format!("no service mounted for '{path}'")),
                );
            }

            tracing::Span::current().record(fields::SERVICE, record.name());
            let mut mdc = MdcContext::new();
            mdc.insert(fields::REQUEST_ID.to_string(), exchange.id().to_string());
            mdc.insert(
                fields::HTTP_METHOD.to_string(),
                exchange.request().method().to_string(),
            );
            mdc.insert(fields::HTTP_PATH.to_string(), path);
            mdc.insert(fields::SERVICE.to_string(), record.name().to_string());
            exchange.attachments_mut().put(&MDC_CONTEXT, mdc);
            exchange.attachments_mut().put(&SELECTED_SERVICE, Arc::clone(&record));

            if let Err(err) = service.init_request(exchange).await {
                return fail(exchange, &err);
            }
            Flow::Continue
        })
    }
}
