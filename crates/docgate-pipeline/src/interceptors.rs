//! Built-in interceptors.

use docgate_core::plugin::{InterceptPoint, Interceptor, PluginDescriptor};
use docgate_core::{BoxFuture, Exchange, GateResult};
use http::header::{HeaderValue, ACCESS_CONTROL_EXPOSE_HEADERS};

/// Headers a token manager attaches to authenticated responses.
pub const DEFAULT_TOKEN_HEADERS: [&str; 3] =
    ["Auth-Token", "Auth-Token-Valid-Until", "Auth-Token-Location"];

/// Adds the token headers to `Access-Control-Expose-Headers` so browsers
/// let cross-origin callers read them.
///
/// Existing exposed headers are kept; each token header is appended once.
#[derive(Debug, Clone)]
pub struct TokenCorsResponseInterceptor {
    headers: Vec<String>,
}

impl Default for TokenCorsResponseInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_HEADERS.iter().map(ToString::to_string).collect())
    }
}

impl TokenCorsResponseInterceptor {
    /// Plugin name.
    pub const NAME: &'static str = "tokenCORSResponseInterceptor";

    /// Creates the interceptor exposing `headers`.
    #[must_use]
    pub const fn new(headers: Vec<String>) -> Self {
        Self { headers }
    }

    /// Returns the plugin descriptor. The `headers` argument overrides the
    /// exposed header list.
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::interceptor(Self::NAME, |ctx| {
            Ok(ctx
                .arg::<Vec<String>>("headers")?
                .map_or_else(Self::default, Self::new))
        })
        .description("adds token headers to Access-Control-Expose-Headers")
    }

    fn merged(&self, existing: Option<&str>) -> String {
        let mut exposed: Vec<String> = existing
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        for header in &self.headers {
            if !exposed.iter().any(|h| h.eq_ignore_ascii_case(header)) {
                exposed.push(header.clone());
            }
        }
        exposed.join(", ")
    }
}

impl Interceptor for TokenCorsResponseInterceptor {
    fn intercept_point(&self) -> InterceptPoint {
        InterceptPoint::Response
    }

    fn resolve(&self, _exchange: &Exchange) -> bool {
        !self.headers.is_empty()
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GateResult<()>> {
        Box::pin(async move {
            let merged = self.merged(
                exchange
                    .response()
                    .header(ACCESS_CONTROL_EXPOSE_HEADERS.as_str()),
            );
            if let Ok(value) = HeaderValue::from_str(&merged) {
                exchange
                    .response_mut()
                    .set_header(ACCESS_CONTROL_EXPOSE_HEADERS, value);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::RequestView;
    use http::Method;

    #[tokio::test]
    async fn test_sets_header_when_absent() {
        let mut exchange = Exchange::new(RequestView::new(Method::GET, "/db"));
        TokenCorsResponseInterceptor::default()
            .handle(&mut exchange)
            .await
            .unwrap();

        assert_eq!(
            exchange.response().header("access-control-expose-headers"),
            Some("Auth-Token, Auth-Token-Valid-Until, Auth-Token-Location")
        );
    }

    #[tokio::test]
    async fn test_appends_without_duplicates() {
        let mut exchange = Exchange::new(RequestView::new(Method::GET, "/db"));
        exchange.response_mut().set_header(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Location, auth-token"),
        );
        TokenCorsResponseInterceptor::new(vec!["Auth-Token".into(), "ETag".into()])
            .handle(&mut exchange)
            .await
            .unwrap();

        assert_eq!(
            exchange.response().header("access-control-expose-headers"),
            Some("Location, auth-token, ETag")
        );
    }
}
