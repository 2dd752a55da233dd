//! In-memory client driving a pipeline.

use crate::error::TestError;
use crate::response::TestResponse;
use bytes::Bytes;
use docgate_pipeline::http::{exchange_from_parts, render};
use docgate_pipeline::Pipeline;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, IF_MATCH, IF_NONE_MATCH};
use http::{HeaderMap, Method};
use serde::Serialize;
use std::sync::Arc;

/// A test client sending requests through a [`Pipeline`] without a socket.
///
/// Each request runs the main and closing stages, is rendered the way the
/// server renders it, and then runs the `ResponseAsync` point before
/// [`TestClientRequest::send`] returns. Effects of asynchronous hooks are
/// therefore visible to the next request.
///
/// ```ignore
/// let client = TestClient::new(Arc::new(pipeline));
/// let res = client.put("/shop/orders/1").json(&json!({"qty": 1})).send().await;
/// assert_eq!(res.status_code(), 201);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct TestClient {
    pipeline: Arc<Pipeline>,
    default_headers: HeaderMap,
}

impl TestClient {
    /// Creates a client over a pipeline.
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            default_headers: HeaderMap::new(),
        }
    }

    /// Adds a header sent with every request.
    ///
    /// Invalid names or values are ignored.
    pub fn with_default_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.default_headers.insert(name, value);
        }
        self
    }

    /// Returns the pipeline.
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Starts a GET request.
    pub fn get(&self, uri: &str) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: &str) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: &str) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: &str) -> TestClientRequest<'_> {
        self.request(Method::PATCH, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: &str) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: &str) -> TestClientRequest<'_> {
        TestClientRequest {
            client: self,
            builder: http::Request::builder()
                .method(method)
                .uri(uri),
            headers: self.default_headers.clone(),
            body: Bytes::new(),
            error: None,
        }
    }

    async fn dispatch(&self, request: http::Request<Bytes>) -> Result<TestResponse, TestError> {
        let (parts, body) = request.into_parts();
        let exchange = self.pipeline.execute(exchange_from_parts(parts, body)).await;
        let response = render(&exchange);
        self.pipeline.complete_async(exchange).await;
        TestResponse::from_http(response).await
    }
}

/// A request bound to a [`TestClient`].
#[must_use]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: http::request::Builder,
    headers: HeaderMap,
    body: Bytes,
    error: Option<TestError>,
}

impl TestClientRequest<'_> {
    /// Sets a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => {
                self.error = Some(TestError::RequestBuild(format!(
                    "invalid header {name}: {value}"
                )));
            }
        }
        self
    }

    /// Sets `If-Match` to a quoted version token.
    pub fn if_match(self, token: &str) -> Self {
        self.header(IF_MATCH.as_str(), &format!("\"{token}\""))
    }

    /// Sets `If-None-Match` to a quoted version token.
    pub fn if_none_match(self, token: &str) -> Self {
        self.header(IF_NONE_MATCH.as_str(), &format!("\"{token}\""))
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and its Content-Type.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.body = Bytes::from(bytes);
                self.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            Err(err) => self.error = Some(err.into()),
        }
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics when the request cannot be built or the response read.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(err) => panic!("test request failed: {err}"),
        }
    }

    /// Sends the request, returning build errors.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut request = self.builder.body(self.body)?;
        request.headers_mut().extend(self.headers);
        self.client.dispatch(request).await
    }
}
