//! Interception at one point.

use crate::dispatcher::InterceptionDispatcher;
use crate::stage::{Flow, Stage};
use docgate_core::plugin::InterceptPoint;
use docgate_core::{BoxFuture, Exchange};
use std::sync::Arc;

/// Runs the [`InterceptionDispatcher`] for one intercept point.
#[derive(Debug, Clone)]
pub struct InterceptStage {
    point: InterceptPoint,
    dispatcher: Arc<InterceptionDispatcher>,
}

impl InterceptStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new(point: InterceptPoint, dispatcher: Arc<InterceptionDispatcher>) -> Self {
        Self { point, dispatcher }
    }

    /// Returns the intercept point.
    pub const fn point(&self) -> InterceptPoint {
        self.point
    }
}

impl Stage for InterceptStage {
    fn name(&self) -> &'static str {
        match self.point {
            InterceptPoint::BeforeAuth => "intercept_before_auth",
            InterceptPoint::AfterAuth => "intercept_after_auth",
            InterceptPoint::BeforeHandler => "intercept_before_handler",
            InterceptPoint::Response => "intercept_response",
            InterceptPoint::ResponseAsync => "intercept_response_async",
        }
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Flow> {
        Box::pin(self.dispatcher.dispatch(self.point, exchange))
    }
}
