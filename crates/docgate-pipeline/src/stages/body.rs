//! Request body parsing.

use crate::stage::{fail, Flow, Stage};
use docgate_core::{BoxFuture, Exchange, GateError};
use serde_json::Value;

/// Parses JSON request bodies into the request content.
///
/// Bodies declared with a non-JSON content type are left raw.
#[derive(Debug, Default, Clone, Copy)]
pub struct BodyStage;

impl Stage for BodyStage {
    fn name(&self) -> &'static str {
        "body"
    }

    fn resolve(&self, exchange: &Exchange) -> bool {
        let request = exchange.request();
        request.content().is_none() && !request.raw_body().is_empty()
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let is_json = exchange
                .request()
                .content_type()
                .map_or(true, |ct| ct.contains("json"));
            if !is_json {
                return Flow::Continue;
            }

            match serde_json::from_slice::<Value>(exchange.request().raw_body()) {
                Ok(content) => {
                    exchange.request_mut().set_content(content);
                    Flow::Continue
                }
                Err(err) => fail(exchange, &GateError::bad_request(format!("Invalid JSON: {err}"))),
            }
        })
    }
}
