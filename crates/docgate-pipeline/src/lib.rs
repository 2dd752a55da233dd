//! # Docgate Pipeline
//!
//! Turns an [`Exchange`](docgate_core::Exchange) into an ordered run of
//! stages and plugins.
//!
//! ## Standard Stages
//!
//! ```text
//! Routing → Body → [BeforeAuth] → Security → [AfterAuth] → [BeforeHandler] → Service → [Response]
//!                                                                                           ↓
//!                          (after the response is sent)  [ResponseAsync] ← AccessLog ←──────┘
//! ```
//!
//! | Stage | Purpose |
//! |-------|---------|
//! | routing | select exactly one service by mount prefix, or 404 |
//! | body | parse JSON request bodies |
//! | intercept | run the [`InterceptionDispatcher`] for one point |
//! | security | global predicates, auth mechanisms, authorizers |
//! | service | invoke the selected service |
//! | access_log | log and count the request; always runs |
//!
//! Every stage returns an explicit [`Flow`]. A stage that fails turns the
//! failure into response state and returns [`Flow::Terminate`]; the remaining
//! main stages are skipped and the closing stages still run.
//!
//! ## Example
//!
//! ```ignore
//! use docgate_pipeline::Pipeline;
//!
//! let pipeline = Pipeline::standard(registry)?;
//! let exchange = pipeline.execute(exchange).await;
//! let response = docgate_pipeline::http::render(&exchange);
//! pipeline.complete_async(exchange).await;
//! ```

#![doc(html_root_url = "https://docs.rs/docgate-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dispatcher;
pub mod http;
pub mod interceptors;
mod pipeline;
mod router;
mod stage;
pub mod stages;

pub use dispatcher::InterceptionDispatcher;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use router::{RouteMatch, ServiceRouter};
pub use stage::{fail, BoxedStage, Flow, FnStage, Stage};
