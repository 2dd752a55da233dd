//! Hooks shipped with the document service.

use docgate_core::plugin::{Hook, PluginArgs, PluginDescriptor};
use docgate_core::{BoxFuture, Exchange, GateResult};

/// Logs the outcome of every write once the response has been sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnooperHook;

impl SnooperHook {
    /// Plugin name.
    pub const NAME: &'static str = "snooper";

    /// Returns the plugin descriptor.
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::hook(Self::NAME, |_| Ok(Self)).description("logs write outcomes")
    }
}

impl Hook for SnooperHook {
    fn supports(&self, exchange: &Exchange) -> bool {
        exchange.request().is_write()
    }

    fn hook<'a>(&'a self, exchange: &'a Exchange, args: &'a PluginArgs) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            let request = exchange.request();
            let response = exchange.response();
            let result = response.operation_result();

            tracing::info!(
                request_id = %exchange.id(),
                http.method = %request.method(),
                http.path = request.path(),
                http.status_code = response.status_or_ok().as_u16(),
                write.status = result.map(|r| r.status.as_u16()),
                write.etag = result.and_then(|r| r.etag.as_ref()).map(|etag| etag.as_str()),
                write.new_id = result.and_then(|r| r.new_id.as_deref()),
                args = ?args.get("label"),
                "write observed"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::{OperationResult, RequestView, VersionToken};
    use http::{Method, StatusCode};

    #[test]
    fn test_supports_writes_only() {
        let get = Exchange::new(RequestView::new(Method::GET, "/db/coll"));
        let put = Exchange::new(RequestView::new(Method::PUT, "/db/coll"));
        assert!(!SnooperHook.supports(&get));
        assert!(SnooperHook.supports(&put));
    }

    #[tokio::test]
    async fn test_hook_never_fails() {
        let mut exchange = Exchange::new(RequestView::new(Method::PUT, "/db/coll/doc"));
        exchange.response_mut().set_operation_result(
            OperationResult::new(StatusCode::CREATED).with_etag(VersionToken::new("a1")),
        );
        exchange.mark_completed();

        let args = PluginArgs::default();
        assert!(SnooperHook.hook(&exchange, &args).await.is_ok());
    }
}
