//! Conversion between HTTP messages and exchanges.

use bytes::Bytes;
use docgate_core::{Exchange, RequestView, ResponseView};
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderName, StatusCode};
use http_body_util::Full;
use serde_json::{Map, Value};

/// Header carrying the request id on every response.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Builds an exchange from request parts and a collected body.
pub fn exchange_from_parts(parts: http::request::Parts, body: Bytes) -> Exchange {
    let uri = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
    let request = RequestView::new(parts.method, &uri)
        .with_headers(parts.headers)
        .with_body(body);
    Exchange::new(request)
}

/// Returns the JSON body with `_warnings` merged in.
fn json_body(response: &ResponseView) -> Option<Value> {
    let mut content = response.content().cloned();
    if !response.warnings().is_empty() {
        let warnings = Value::from(response.warnings().to_vec());
        match content.as_mut() {
            Some(Value::Object(map)) => {
                map.insert("_warnings".to_string(), warnings);
            }
            Some(_) => {}
            None => {
                let mut map = Map::new();
                map.insert("_warnings".to_string(), warnings);
                content = Some(Value::Object(map));
            }
        }
    }
    content
}

/// Renders the response of an exchange.
///
/// Warnings are reported in a `_warnings` array: merged into object bodies,
/// or as the whole body when there is none. A raw body is sent as is.
/// `204` and `304` responses never carry a body.
pub fn render(exchange: &Exchange) -> http::Response<Full<Bytes>> {
    let response = exchange.response();
    let status = response.status_or_ok();

    let body_allowed = !matches!(status, StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED);
    let body = match response.raw_content() {
        _ if !body_allowed => Bytes::new(),
        Some(raw) => {
            if !response.warnings().is_empty() {
                tracing::debug!(warnings = ?response.warnings(), "warnings not rendered in a raw body");
            }
            raw.clone()
        }
        None => json_body(response).map_or_else(Bytes::new, |content| Bytes::from(content.to_string())),
    };

    let mut builder = http::Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in response.headers() {
            headers.append(name, value.clone());
        }
        if !body.is_empty() {
            let content_type = response.content_type().unwrap_or("application/json");
            if let Ok(value) = HeaderValue::from_str(content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        if let Ok(value) = HeaderValue::from_str(&exchange.id().to_string()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }

    builder.body(Full::new(body)).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to build response");
        let mut fallback = http::Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
