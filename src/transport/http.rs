//! HTTP transport for the gateway.
//!
//! Routes:
//! - `GET /`: plain-text liveness response
//! - `GET|POST /query`: run SQL against a database
//! - `POST /upsert`: insert-or-update rows
//!
//! Handler work runs in a spawned task so a client disconnect does not cancel
//! an in-flight statement or skip the connection release.

use crate::db::{ConnectionSource, PoolManager};
use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{Gateway, RequestInput};
use crate::models::QueryOutput;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, RawQuery, State};
use axum::http::{HeaderMap, header};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// HTTP transport serving the gateway endpoints.
pub struct HttpTransport {
    gateway: Arc<Gateway<PoolManager>>,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    body_limit: usize,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(
        gateway: Arc<Gateway<PoolManager>>,
        host: impl Into<String>,
        port: u16,
        body_limit: usize,
    ) -> Self {
        Self {
            gateway,
            host: host.into(),
            port,
            body_limit,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn run(&self) -> GatewayResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting SQL gateway on {}", bind_addr);

        let app = router(Arc::clone(&self.gateway), self.body_limit);

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        // Keep-alive connections may hold the server open, so force exit after
        // a timeout once the shutdown signal is received
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // Race between: server completing normally vs forced timeout/second signal after shutdown
        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(GatewayError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database pools");
        self.gateway.source().close_all().await;

        Ok(())
    }
}

/// Build the gateway router for any connection source.
pub fn router<S: ConnectionSource>(gateway: Arc<Gateway<S>>, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/query", get(query::<S>).post(query::<S>))
        .route("/upsert", axum::routing::post(upsert::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn hello() -> &'static str {
    "Hello World"
}

async fn query<S: ConnectionSource>(
    State(gateway): State<Arc<Gateway<S>>>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> GatewayResult<Json<QueryOutput>> {
    let input = request_input(&headers, raw_query, body);
    let output = tokio::spawn(async move { gateway.query(&headers, &input).await })
        .await
        .map_err(join_error)??;
    Ok(Json(output))
}

async fn upsert<S: ConnectionSource>(
    State(gateway): State<Arc<Gateway<S>>>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> GatewayResult<Json<QueryOutput>> {
    let input = request_input(&headers, raw_query, body);
    let output = tokio::spawn(async move { gateway.upsert(&headers, &input).await })
        .await
        .map_err(join_error)??;
    Ok(Json(output))
}

fn request_input(headers: &HeaderMap, query: Option<String>, body: Bytes) -> RequestInput {
    RequestInput {
        query,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    }
}

fn join_error(e: tokio::task::JoinError) -> GatewayError {
    GatewayError::internal(format!("Request task failed: {}", e))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
