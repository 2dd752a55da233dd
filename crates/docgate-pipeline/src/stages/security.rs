//! Authentication and authorization.

use crate::stage::{fail, Flow, Stage};
use docgate_core::plugin::{AuthOutcome, PluginKind, PluginRegistry};
use docgate_core::{BoxFuture, Exchange, GateError, MDC_CONTEXT};
use docgate_telemetry::fields;
use std::sync::Arc;

/// Enforces global security predicates, runs auth mechanisms and consults
/// authorizers.
///
/// - a failing global predicate responds 403
/// - the first mechanism that authenticates sets the principal; a mechanism
///   that rejects presented credentials responds 401
/// - every enabled authorizer must allow the request; a denial responds 401
///   for anonymous callers and 403 otherwise
///
/// With no mechanisms and no authorizers registered, requests pass as anonymous.
#[derive(Debug, Clone)]
pub struct SecurityStage {
    registry: Arc<PluginRegistry>,
}

impl SecurityStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    async fn authenticate(&self, exchange: &mut Exchange) -> Result<(), GateError> {
        for record in self.registry.enabled(PluginKind::AuthMechanism)? {
            let Some(mechanism) = record.as_auth_mechanism() else {
                continue;
            };
            match mechanism.authenticate(exchange).await {
                AuthOutcome::NotAttempted => {}
                AuthOutcome::Authenticated(principal) => {
                    tracing::debug!(
                        mechanism = record.name(),
                        principal = %principal.log_id(),
                        "authenticated"
                    );
                    if let Some(mdc) = exchange.attachments_mut().get_mut(&MDC_CONTEXT) {
                        mdc.insert(fields::PRINCIPAL.to_string(), principal.log_id());
                    }
                    exchange.request_mut().set_principal(principal);
                    return Ok(());
                }
                AuthOutcome::Failed(reason) => {
                    tracing::debug!(mechanism = record.name(), %reason, "authentication failed");
                    return Err(GateError::unauthorized(reason));
                }
            }
        }
        Ok(())
    }

    fn authorize(&self, exchange: &Exchange) -> Result<(), GateError> {
        let authenticated = exchange.request().principal().is_authenticated();
        let authorizers = self.registry.enabled(PluginKind::Authorizer)?;

        for record in &authorizers {
            let Some(authorizer) = record.as_authorizer() else {
                continue;
            };
            if !authenticated && authorizer.is_authentication_required(exchange) {
                return Err(GateError::unauthorized("authentication required"));
            }
        }

        for record in &authorizers {
            let Some(authorizer) = record.as_authorizer() else {
                continue;
            };
            if !authorizer.is_allowed(exchange) {
                tracing::debug!(authorizer = record.name(), "request denied");
                return Err(if authenticated {
                    GateError::forbidden(format!("denied by authorizer '{}'", record.name()))
                } else {
                    GateError::unauthorized("authentication required")
                });
            }
        }
        Ok(())
    }
}

impl Stage for SecurityStage {
    fn name(&self) -> &'static str {
        "security"
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            for predicate in self.registry.global_predicates() {
                if !predicate.resolve(exchange) {
                    tracing::debug!(predicate = predicate.name(), "global security predicate failed");
                    return fail(
                        exchange,
                        &GateError::forbidden(format!(
                            "request rejected by security predicate '{}'",
                            predicate.name()
                        )),
                    );
                }
            }

            if let Err(err) = self.authenticate(exchange).await {
                return fail(exchange, &err);
            }
            if let Err(err) = self.authorize(exchange) {
                return fail(exchange, &err);
            }
            Flow::Continue
        })
    }
}
