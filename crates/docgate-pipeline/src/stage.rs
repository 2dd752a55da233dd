//! Pipeline stages.
//!
//! A [`Stage`] is one link of the pipeline. Instead of calling a "next"
//! continuation, a stage returns a [`Flow`] saying whether the pipeline should
//! go on. Forgetting to continue is therefore a type error, not a hung request.
//!
//! # Example
//!
//! ```
//! use docgate_pipeline::{Flow, FnStage};
//!
//! let stage = FnStage::new("stamp", |exchange| {
//!     Box::pin(async move {
//!         exchange.response_mut().add_warning("stamped");
//!         Flow::Continue
//!     })
//! });
//! ```

use docgate_core::{BoxFuture, Exchange, GateError};
use std::sync::Arc;

/// What the pipeline does after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the next stage.
    Continue,
    /// Skip the remaining main stages.
    Terminate,
}

impl Flow {
    /// Returns `true` for [`Flow::Terminate`].
    #[must_use]
    pub const fn is_terminate(self) -> bool {
        matches!(self, Self::Terminate)
    }
}

/// A link of the pipeline.
///
/// Stages are shared by every request and must be safe to run concurrently.
pub trait Stage: Send + Sync + 'static {
    /// Returns the stage name, used in logs.
    fn name(&self) -> &'static str;

    /// Returns `false` to skip this stage for an exchange. Must be pure.
    fn resolve(&self, _exchange: &Exchange) -> bool {
        true
    }

    /// Runs the stage.
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Flow>;
}

/// A type-erased stage.
pub type BoxedStage = Arc<dyn Stage>;

/// Puts the response in error and terminates.
pub fn fail(exchange: &mut Exchange, error: &GateError) -> Flow {
    tracing::debug!(
        request_id = %exchange.id(),
        status = error.status_code().as_u16(),
        error = %error,
        "request failed"
    );
    exchange.response_mut().set_error(error);
    Flow::Terminate
}

/// A stage built from a function.
pub struct FnStage<F> {
    name: &'static str,
    func: F,
}

impl<F> FnStage<F>
where
    F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
{
    /// Creates a function-based stage.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Stage for FnStage<F>
where
    F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Flow> {
        (self.func)(exchange)
    }
}
