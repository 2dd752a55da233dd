//! The per-request exchange.
//!
//! An [`Exchange`] is created once per incoming request and owned by exactly
//! one pipeline execution. Stages and plugins read the [`RequestView`], mutate
//! the [`ResponseView`] and share typed state through
//! [`Attachments`](crate::Attachments).
//!
//! Two rules are enforced here rather than by each plugin:
//!
//! - once the response is in error, its status cannot be set back to a 2xx
//! - once the exchange is completed (response sent), the response is frozen

use crate::attachment::{AttachmentKey, Attachments};
use crate::data::{OperationResult, ResourceRef, VersionToken};
use crate::error::GateError;
use crate::identity::Principal;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Diagnostic context copied into every log line of a request.
pub type MdcContext = BTreeMap<String, String>;

/// Attachment holding the request's [`MdcContext`].
pub const MDC_CONTEXT: AttachmentKey<MdcContext> = AttachmentKey::new("mdc-context");

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it suitable for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type of resource a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    /// The root listing.
    Root,
    /// A database.
    Database,
    /// A collection.
    Collection,
    /// A document.
    Document,
    /// A file bucket.
    FilesBucket,
    /// A file.
    File,
    /// Anything not addressed through the document store, such as a custom service.
    Other,
}

/// Read-mostly view of the incoming request.
#[derive(Debug, Clone)]
pub struct RequestView {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    raw_body: Bytes,
    content: Option<Value>,
    resource: Option<ResourceRef>,
    principal: Principal,
    service: Option<String>,
    mount: Option<String>,
    collection_props: Option<Value>,
}

impl RequestView {
    /// Creates a request from a method and a URI (`/path?query`).
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (uri, Vec::new()),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: HeaderMap::new(),
            raw_body: Bytes::new(),
            content: None,
            resource: None,
            principal: Principal::Anonymous,
            service: None,
            mount: None,
            collection_props: None,
        }
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.raw_body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    #[must_use]
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    /// Sets the principal.
    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }

    /// Returns the HTTP method.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path below the mount point of the matched service.
    ///
    /// The mount is matched segment by segment, so `//graphql/x` under
    /// `/graphql` gives `/x` and `/graphqlx` is not below it.
    pub fn relative_path(&self) -> &str {
        let Some(mount) = self.mount.as_deref() else {
            return &self.path;
        };
        match strip_mount(&self.path, mount) {
            Some("") => "/",
            Some(rest) => rest,
            None => &self.path,
        }
    }

    /// Returns all query parameters in order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the first value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the request headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the content type.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body.
    pub const fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Returns the parsed body, if it has been parsed.
    pub const fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// Returns the parsed body mutably.
    pub fn content_mut(&mut self) -> Option<&mut Value> {
        self.content.as_mut()
    }

    /// Sets the parsed body.
    pub fn set_content(&mut self, content: Value) {
        self.content = Some(content);
    }

    /// Removes and returns the parsed body.
    pub fn take_content(&mut self) -> Option<Value> {
        self.content.take()
    }

    /// Returns the addressed store resource.
    pub const fn resource(&self) -> Option<&ResourceRef> {
        self.resource.as_ref()
    }

    /// Sets the addressed store resource.
    pub fn set_resource(&mut self, resource: ResourceRef) {
        self.resource = Some(resource);
    }

    /// Returns the resolved resource type.
    pub fn resource_type(&self) -> ResourceType {
        self.resource
            .as_ref()
            .map_or(ResourceType::Other, ResourceRef::resource_type)
    }

    /// Returns the authenticated principal.
    pub const fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Sets the authenticated principal.
    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = principal;
    }

    /// Returns the name of the matched service.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Returns the mount point of the matched service.
    pub fn mount(&self) -> Option<&str> {
        self.mount.as_deref()
    }

    /// Records the service that will handle this request.
    pub fn set_service(&mut self, name: impl Into<String>, mount: impl Into<String>) {
        self.service = Some(name.into());
        self.mount = Some(mount.into());
    }

    /// Returns the metadata of the addressed collection (or database).
    pub const fn collection_props(&self) -> Option<&Value> {
        self.collection_props.as_ref()
    }

    /// Sets the metadata of the addressed collection.
    pub fn set_collection_props(&mut self, props: Option<Value>) {
        self.collection_props = props;
    }

    /// Returns the version token from `If-Match`.
    pub fn version_token(&self) -> Option<VersionToken> {
        self.headers
            .get(IF_MATCH)
            .and_then(|v| v.to_str().ok())
            .and_then(VersionToken::from_header)
    }

    /// Returns the version token from `If-None-Match`.
    pub fn if_none_match(&self) -> Option<VersionToken> {
        self.headers
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .and_then(VersionToken::from_header)
    }

    /// Returns `true` for POST, PUT, PATCH and DELETE.
    pub fn is_write(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    /// Returns `true` for GET.
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }
}

fn strip_mount<'p>(path: &'p str, mount: &str) -> Option<&'p str> {
    let mut rest = path;
    for segment in mount.split('/').filter(|s| !s.is_empty()) {
        let after = rest.trim_start_matches('/').strip_prefix(segment)?;
        if !after.is_empty() && !after.starts_with('/') {
            return None;
        }
        rest = after;
    }
    Some(rest)
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

// Form encoding: `+` is a space. Invalid UTF-8 keeps the raw text.
fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw,
    }
}

/// Mutable view of the response being built.
#[derive(Debug, Clone, Default)]
pub struct ResponseView {
    status: Option<StatusCode>,
    headers: HeaderMap,
    content_type: Option<String>,
    content: Option<Value>,
    raw_content: Option<Bytes>,
    in_error: bool,
    warnings: Vec<String>,
    operation_result: Option<OperationResult>,
    committed: bool,
}

impl ResponseView {
    /// Returns the status, if one has been set.
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns the status, defaulting to 200.
    pub fn status_or_ok(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Sets the status. Returns `false` when refused.
    ///
    /// A success status is refused while the response is in error.
    pub fn set_status(&mut self, status: StatusCode) -> bool {
        if self.committed {
            tracing::debug!(%status, "response already sent, status not changed");
            return false;
        }
        if self.in_error && status.is_success() {
            tracing::debug!(%status, "response is in error, success status refused");
            return false;
        }
        self.status = Some(status);
        true
    }

    /// Puts the response in error with a status and an error body.
    pub fn set_in_error(&mut self, status: StatusCode, message: impl Into<String>) -> bool {
        if self.committed {
            return false;
        }
        let message = message.into();
        self.in_error = true;
        self.status = Some(status);
        self.content_type = Some("application/json".to_string());
        self.raw_content = None;
        self.content = Some(json!({
            "http status code": status.as_u16(),
            "http status description": status.canonical_reason().unwrap_or_default(),
            "message": message,
        }));
        true
    }

    /// Puts the response in error from a [`GateError`]. Plugin failures keep
    /// the plugin name in the message.
    pub fn set_error(&mut self, error: &GateError) -> bool {
        let message = match error {
            GateError::PluginExecution { .. } => error.to_string(),
            _ => error.message().to_string(),
        };
        self.set_in_error(error.status_code(), message)
    }

    /// Returns `true` once the response is in error.
    pub const fn is_in_error(&self) -> bool {
        self.in_error
    }

    /// Returns the response headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header, replacing previous values.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> bool {
        if self.committed {
            return false;
        }
        self.headers.insert(name, value);
        true
    }

    /// Sets the `ETag` header.
    pub fn set_etag(&mut self, etag: &VersionToken) -> bool {
        match HeaderValue::from_str(&etag.to_header_value()) {
            Ok(value) => self.set_header(ETAG, value),
            Err(_) => false,
        }
    }

    /// Returns the content type.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Sets the content type.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> bool {
        if self.committed {
            return false;
        }
        self.content_type = Some(content_type.into());
        true
    }

    /// Returns the response body.
    pub const fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// Returns the response body mutably. `None` once committed.
    pub fn content_mut(&mut self) -> Option<&mut Value> {
        if self.committed {
            None
        } else {
            self.content.as_mut()
        }
    }

    /// Sets a JSON response body.
    pub fn set_content(&mut self, content: Value) -> bool {
        if self.committed {
            return false;
        }
        self.content = Some(content);
        self.raw_content = None;
        if self.content_type.is_none() {
            self.content_type = Some("application/json".to_string());
        }
        true
    }

    /// Returns the raw response body, set instead of a JSON one.
    pub const fn raw_content(&self) -> Option<&Bytes> {
        self.raw_content.as_ref()
    }

    /// Sets a raw response body with its content type. Response
    /// transformers see no JSON content for it.
    pub fn set_raw_content(&mut self, body: Bytes, content_type: impl Into<String>) -> bool {
        if self.committed {
            return false;
        }
        self.content = None;
        self.raw_content = Some(body);
        self.content_type = Some(content_type.into());
        true
    }

    /// Removes the response body.
    pub fn clear_content(&mut self) -> bool {
        if self.committed {
            return false;
        }
        self.content = None;
        self.raw_content = None;
        true
    }

    /// Appends a warning reported in `_warnings`.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Returns the collected warnings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the result of the data layer write, if any.
    pub const fn operation_result(&self) -> Option<&OperationResult> {
        self.operation_result.as_ref()
    }

    /// Records the result of the data layer write.
    pub fn set_operation_result(&mut self, result: OperationResult) {
        self.operation_result = Some(result);
    }

    /// Returns `true` once the response has been sent.
    pub const fn is_committed(&self) -> bool {
        self.committed
    }
}

/// Per-request state flowing through the pipeline.
#[derive(Debug)]
pub struct Exchange {
    id: RequestId,
    request: RequestView,
    response: ResponseView,
    attachments: Attachments,
    started_at: Instant,
}

impl Exchange {
    /// Creates an exchange for a request with a fresh request id.
    #[must_use]
    pub fn new(request: RequestView) -> Self {
        Self {
            id: RequestId::new(),
            request,
            response: ResponseView::default(),
            attachments: Attachments::new(),
            started_at: Instant::now(),
        }
    }

    /// Returns the request id.
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the request view.
    pub const fn request(&self) -> &RequestView {
        &self.request
    }

    /// Returns the request view mutably.
    pub fn request_mut(&mut self) -> &mut RequestView {
        &mut self.request
    }

    /// Returns the response view.
    pub const fn response(&self) -> &ResponseView {
        &self.response
    }

    /// Returns the response view mutably.
    pub fn response_mut(&mut self) -> &mut ResponseView {
        &mut self.response
    }

    /// Returns the attachments.
    pub const fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    /// Returns the attachments mutably.
    pub fn attachments_mut(&mut self) -> &mut Attachments {
        &mut self.attachments
    }

    /// Borrows request, response and attachments separately.
    pub fn parts_mut(&mut self) -> (&mut RequestView, &mut ResponseView, &mut Attachments) {
        (&mut self.request, &mut self.response, &mut self.attachments)
    }

    /// Returns `true` when the response is in error.
    pub const fn is_in_error(&self) -> bool {
        self.response.in_error
    }

    /// Returns `true` once the response has been sent.
    pub const fn is_completed(&self) -> bool {
        self.response.committed
    }

    /// Marks the response as sent. The response view is frozen afterwards.
    pub fn mark_completed(&mut self) {
        self.response.committed = true;
    }

    /// Returns the time since the exchange was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_query() {
        let request = RequestView::new(Method::GET, "/db?page=2&pagesize=10&np");
        assert_eq!(request.path(), "/db");
        assert_eq!(request.query_param("page"), Some("2"));
        assert_eq!(request.query_param("pagesize"), Some("10"));
        assert_eq!(request.query_param("np"), Some(""));
        assert_eq!(request.query_param("missing"), None);
    }

    #[test]
    fn test_query_is_percent_decoded() {
        let request = RequestView::new(
            Method::GET,
            "/db/coll?filter=%7B%22name%22%3A%22a%26b%22%7D&sort=%7B%22_id%22%3A-1%7D&q=a+b&bad=%FF",
        );
        assert_eq!(request.query_param("filter"), Some(r#"{"name":"a&b"}"#));
        assert_eq!(request.query_param("sort"), Some(r#"{"_id":-1}"#));
        assert_eq!(request.query_param("q"), Some("a b"));
        assert_eq!(request.query_param("bad"), Some("%FF"));
    }

    #[test]
    fn test_relative_path() {
        let mut request = RequestView::new(Method::GET, "/graphql/shop");
        assert_eq!(request.relative_path(), "/graphql/shop");
        request.set_service("graphql", "/graphql");
        assert_eq!(request.relative_path(), "/shop");
        request.set_service("graphql", "/graphql/shop");
        assert_eq!(request.relative_path(), "/");
    }

    #[test]
    fn test_relative_path_matches_whole_segments() {
        let mut request = RequestView::new(Method::GET, "//graphql/shop");
        request.set_service("graphql", "/graphql");
        assert_eq!(request.relative_path(), "/shop");

        let mut request = RequestView::new(Method::GET, "/graphqlx/shop");
        request.set_service("graphql", "/graphql");
        assert_eq!(request.relative_path(), "/graphqlx/shop");

        let mut request = RequestView::new(Method::GET, "/db/coll");
        request.set_service("mongo", "/");
        assert_eq!(request.relative_path(), "/db/coll");
    }

    #[test]
    fn test_version_tokens_from_headers() {
        let request = RequestView::new(Method::PUT, "/db/coll/1")
            .with_header("if-match", "\"a1\"")
            .with_header("if-none-match", "W/\"a2\"");
        assert_eq!(request.version_token(), Some(VersionToken::new("a1")));
        assert_eq!(request.if_none_match(), Some(VersionToken::new("a2")));
        assert!(request.is_write());
    }

    #[test]
    fn test_in_error_refuses_success_status() {
        let mut response = ResponseView::default();
        assert!(response.set_in_error(StatusCode::CONFLICT, "stale"));
        assert!(!response.set_status(StatusCode::OK));
        assert_eq!(response.status(), Some(StatusCode::CONFLICT));
        assert!(response.set_status(StatusCode::BAD_REQUEST));

        let body = response.content().unwrap();
        assert_eq!(body["http status code"], 409);
        assert_eq!(body["http status description"], "Conflict");
        assert_eq!(body["message"], "stale");
    }

    #[test]
    fn test_raw_content_replaced_by_error() {
        let mut response = ResponseView::default();
        response.set_raw_content(Bytes::from_static(b"\x89PNG"), "image/png");
        assert_eq!(response.content_type(), Some("image/png"));
        assert!(response.content().is_none());

        response.set_in_error(StatusCode::NOT_FOUND, "gone");
        assert!(response.raw_content().is_none());
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[test]
    fn test_set_error_message() {
        let mut response = ResponseView::default();
        response.set_error(&GateError::version_conflict("stale token"));
        assert_eq!(response.content().unwrap()["message"], "stale token");

        let mut response = ResponseView::default();
        response.set_error(&GateError::plugin("snooper", "boom"));
        assert_eq!(response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(
            response.content().unwrap()["message"],
            "Error executing plugin 'snooper': boom"
        );
    }

    #[test]
    fn test_completed_exchange_freezes_response() {
        let mut exchange = Exchange::new(RequestView::new(Method::GET, "/"));
        exchange.response_mut().set_status(StatusCode::OK);
        exchange.mark_completed();

        assert!(exchange.is_completed());
        assert!(!exchange.response_mut().set_status(StatusCode::NOT_FOUND));
        assert!(!exchange.response_mut().set_content(json!({"a": 1})));
        assert!(exchange.response_mut().content_mut().is_none());
        assert_eq!(exchange.response().status(), Some(StatusCode::OK));
    }

    #[test]
    fn test_warnings_accumulate() {
        let mut response = ResponseView::default();
        response.add_warning("one");
        response.add_warning("two");
        assert_eq!(response.warnings(), ["one", "two"]);
    }
}
