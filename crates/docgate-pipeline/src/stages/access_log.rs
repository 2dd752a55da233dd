//! Request completion logging.

use crate::stage::{Flow, Stage};
use docgate_core::{BoxFuture, Exchange};
use docgate_telemetry::metrics::record_request;

/// Logs and counts every request. Runs even when the pipeline terminated early.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessLogStage;

impl Stage for AccessLogStage {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let elapsed = exchange.elapsed();
            let status = exchange.response().status_or_ok().as_u16();
            let request = exchange.request();
            docgate_telemetry::log_request_complete!(
                exchange.id(),
                request.method(),
                request.path(),
                status,
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
            );
            record_request(request.service().unwrap_or("none"), status, elapsed);
            Flow::Continue
        })
    }
}
