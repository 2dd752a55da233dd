//! The request pipeline.
//!
//! A [`Pipeline`] holds two ordered lists of stages:
//!
//! 1. **Main stages** run in order until one returns [`Flow::Terminate`]
//! 2. **Closing stages** always run, whatever the main stages did
//!
//! Once the response has been handed to the client, [`Pipeline::complete_async`]
//! marks the exchange completed and runs the `ResponseAsync` point.

use crate::dispatcher::InterceptionDispatcher;
use crate::router::ServiceRouter;
use crate::stage::{BoxedStage, Flow, Stage};
use crate::stages::{
    AccessLogStage, BodyStage, InterceptStage, RoutingStage, SecurityStage, ServiceStage,
};
use docgate_core::plugin::{InterceptPoint, PluginRegistry};
use docgate_core::{Exchange, GateResult};
use std::sync::Arc;
use tracing::Instrument;

/// An immutable, shareable sequence of stages.
///
/// # Example
///
/// ```ignore
/// use docgate_pipeline::Pipeline;
///
/// let pipeline = Pipeline::standard(registry)?;
/// assert_eq!(pipeline.stage_names()[0], "routing");
/// ```
pub struct Pipeline {
    stages: Vec<BoxedStage>,
    finally: Vec<BoxedStage>,
    dispatcher: Option<Arc<InterceptionDispatcher>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Builds the standard pipeline over a sealed registry.
    ///
    /// Fails when the enabled services cannot be mounted.
    pub fn standard(registry: Arc<PluginRegistry>) -> GateResult<Self> {
        let router = ServiceRouter::from_registry(&registry)?;
        let dispatcher = Arc::new(InterceptionDispatcher::new(Arc::clone(&registry)));
        let intercept =
            |point| InterceptStage::new(point, Arc::clone(&dispatcher));

        Ok(Self::builder()
            .stage(RoutingStage::new(router))
            .stage(BodyStage)
            .stage(intercept(InterceptPoint::BeforeAuth))
            .stage(SecurityStage::new(registry))
            .stage(intercept(InterceptPoint::AfterAuth))
            .stage(intercept(InterceptPoint::BeforeHandler))
            .stage(ServiceStage)
            .stage(intercept(InterceptPoint::Response))
            .finally(AccessLogStage)
            .dispatcher(Arc::clone(&dispatcher))
            .build())
    }

    /// Runs the exchange through the main and closing stages.
    pub async fn execute(&self, mut exchange: Exchange) -> Exchange {
        let span = tracing::info_span!(
            "request",
            request_id = %exchange.id(),
            http.method = %exchange.request().method(),
            http.path = %exchange.request().path(),
            service = tracing::field::Empty,
        );

        async {
            for stage in &self.stages {
                if !stage.resolve(&exchange) {
                    continue;
                }
                if stage.handle(&mut exchange).await.is_terminate() {
                    tracing::debug!(stage = stage.name(), "pipeline terminated");
                    break;
                }
            }
            for stage in &self.finally {
                if stage.resolve(&exchange) {
                    let _ = stage.handle(&mut exchange).await;
                }
            }
        }
        .instrument(span)
        .await;

        exchange
    }

    /// Marks the exchange completed and runs the `ResponseAsync` point.
    ///
    /// Call this after the response has been sent. The response can no
    /// longer be changed; warnings raised here are only logged.
    pub async fn complete_async(&self, mut exchange: Exchange) -> Exchange {
        exchange.mark_completed();
        if let Some(dispatcher) = &self.dispatcher {
            let span = tracing::info_span!("response_async", request_id = %exchange.id());
            dispatcher.dispatch_async(&mut exchange).instrument(span).await;
        }
        exchange
    }

    /// Returns the stage names in order, closing stages last.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .chain(&self.finally)
            .map(|stage| stage.name())
            .collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len() + self.finally.len()
    }
}

/// Builder for a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedStage>,
    finally: Vec<BoxedStage>,
    dispatcher: Option<Arc<InterceptionDispatcher>>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a main stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends a closing stage.
    #[must_use]
    pub fn finally(mut self, stage: impl Stage) -> Self {
        self.finally.push(Arc::new(stage));
        self
    }

    /// Sets the dispatcher used by [`Pipeline::complete_async`].
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<InterceptionDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
            finally: self.finally,
            dispatcher: self.dispatcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::FnStage;
    use docgate_core::RequestView;
    use http::{Method, StatusCode};

    fn exchange() -> Exchange {
        Exchange::new(RequestView::new(Method::GET, "/db"))
    }

    #[tokio::test]
    async fn test_terminate_skips_main_stages_but_not_closing() {
        let pipeline = Pipeline::builder()
            .stage(FnStage::new("stop", |exchange| {
                Box::pin(async move {
                    exchange
                        .response_mut()
                        .set_in_error(StatusCode::FORBIDDEN, "no");
                    Flow::Terminate
                })
            }))
            .stage(FnStage::new("never", |exchange| {
                Box::pin(async move {
                    exchange.response_mut().add_warning("ran");
                    Flow::Continue
                })
            }))
            .finally(FnStage::new("closing", |exchange| {
                Box::pin(async move {
                    exchange.response_mut().add_warning("closed");
                    Flow::Continue
                })
            }))
            .build();

        let exchange = pipeline.execute(exchange()).await;
        assert_eq!(exchange.response().status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(exchange.response().warnings(), ["closed"]);
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let pipeline = Pipeline::builder()
            .stage(FnStage::new("a", |exchange| {
                Box::pin(async move {
                    exchange.response_mut().add_warning("a");
                    Flow::Continue
                })
            }))
            .stage(FnStage::new("b", |exchange| {
                Box::pin(async move {
                    exchange.response_mut().add_warning("b");
                    Flow::Continue
                })
            }))
            .build();

        assert_eq!(pipeline.stage_names(), ["a", "b"]);
        let exchange = pipeline.execute(exchange()).await;
        assert_eq!(exchange.response().warnings(), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_complete_async_marks_completed() {
        let pipeline = Pipeline::builder().build();
        let exchange = pipeline.complete_async(exchange()).await;
        assert!(exchange.is_completed());
        assert!(exchange.response().is_committed());
    }
}
