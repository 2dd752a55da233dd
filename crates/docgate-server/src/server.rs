//! HTTP server.
//!
//! Accepts HTTP/1.1 connections with hyper and runs every request through
//! the [`Pipeline`]:
//!
//! ```text
//!  accept ─► collect body ─► exchange_from_parts ─► spawn ─┬─► Pipeline::execute ─► render ─► client
//!                                                         └─► complete_async (hooks)
//! ```
//!
//! Each exchange runs on its own task. A timeout or a closed connection
//! discards the response but never cancels a stage, so closing stages and
//! hooks always run. The response-async phase starts after the response is
//! handed over and never delays the client.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use docgate_core::{Exchange, RequestView};
use docgate_pipeline::http::{exchange_from_parts, render};
use docgate_pipeline::Pipeline;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::error::ServerError;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address.
    pub http_addr: String,
    /// How long to wait for open connections on shutdown.
    pub shutdown_timeout: Duration,
    /// Limit for reading the body and running the pipeline.
    pub request_timeout: Duration,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        self.http_addr
            .parse()
            .map_err(|err: std::net::AddrParseError| ServerError::InvalidAddress {
                addr: self.http_addr.clone(),
                reason: err.to_string(),
            })
    }
}

/// Serves a [`Pipeline`] over HTTP.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    pipeline: Arc<Pipeline>,
}

impl Server {
    /// Creates a server.
    pub fn new(config: ServerConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { config, pipeline }
    }

    /// Returns the settings.
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// triggers, then waits for open connections up to the shutdown timeout.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "server listening");
        }

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(err) = server.handle_connection(stream, shutdown).await {
                                tracing::debug!(%remote_addr, error = %err, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(err) => tracing::error!(error = %err, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout;
        tracing::info!(
            open = tracker.active_connections(),
            timeout_secs = timeout.as_secs(),
            "waiting for open connections"
        );
        tokio::select! {
            () = tracker.wait_for_shutdown() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(timeout) => tracing::warn!(
                open = tracker.active_connections(),
                "shutdown timeout reached"
            ),
        }
        tracing::info!("server stopped");
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |request: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(request).await) }
        });

        let connection = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(connection);
        tokio::select! {
            result = connection.as_mut() => result,
            () = shutdown.recv() => {
                connection.as_mut().graceful_shutdown();
                connection.await
            }
        }
    }

    async fn handle_request(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let timeout = self.config.request_timeout;

        let body = Limited::new(body, self.config.max_body_bytes);
        let body = match tokio::time::timeout(timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(err)) if err.downcast_ref::<LengthLimitError>().is_some() => {
                return error_response(
                    &method,
                    &path,
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!(
                        "request body exceeds {} bytes",
                        self.config.max_body_bytes
                    ),
                );
            }
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "failed to read request body");
                return error_response(
                    &method,
                    &path,
                    StatusCode::BAD_REQUEST,
                    format!("failed to read request body: {err}"),
                );
            }
            Err(_) => {
                return error_response(
                    &method,
                    &path,
                    StatusCode::REQUEST_TIMEOUT,
                    "request body not received in time",
                );
            }
        };

        let exchange = exchange_from_parts(parts, body);
        let rendered = spawn_exchange(Arc::clone(&self.pipeline), exchange);

        match tokio::time::timeout(timeout, rendered).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                tracing::error!(http.method = %method, http.path = %path, "request task aborted");
                error_response(
                    &method,
                    &path,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "request processing aborted",
                )
            }
            Err(_) => {
                tracing::warn!(http.method = %method, http.path = %path, "request timed out");
                error_response(
                    &method,
                    &path,
                    StatusCode::GATEWAY_TIMEOUT,
                    "request processing timed out",
                )
            }
        }
    }
}

/// Runs the exchange on its own task and returns the rendered response.
///
/// The task owns the exchange. Dropping the receiver on timeout or client
/// disconnect only discards the response; the exchange still runs to the end
/// of its response-async phase.
fn spawn_exchange(
    pipeline: Arc<Pipeline>,
    exchange: Exchange,
) -> oneshot::Receiver<Response<Full<Bytes>>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let exchange = pipeline.execute(exchange).await;
        if tx.send(render(&exchange)).is_err() {
            tracing::debug!(request_id = %exchange.id(), "client gone, response discarded");
        }
        pipeline.complete_async(exchange).await;
    });
    rx
}

fn error_response(
    method: &http::Method,
    path: &str,
    status: StatusCode,
    message: impl Into<String>,
) -> Response<Full<Bytes>> {
    let mut exchange = Exchange::new(RequestView::new(method.clone(), path));
    exchange.response_mut().set_in_error(status, message);
    render(&exchange)
}
