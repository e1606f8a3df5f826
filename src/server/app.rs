//! Control surface server.
//!
//! Serves the REST router, handles signals and stops the watcher on the
//! way out.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::rest::{create_rest_router, AppState};
use crate::config::Config;
use crate::error::ServerError;
use crate::Result;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// How long shutdown waits for a running reindex to finish.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            ..Self::default()
        }
    }
}

/// Application server.
pub struct App {
    config: ServerConfig,
    state: AppState,
    shutdown: CancellationToken,
}

impl App {
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the server when cancelled, as a signal would.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Build the router with all endpoints.
    fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_rest_router(self.state.clone())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &axum::http::Request<_>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");

                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id,
                        )
                    })
                    .on_response(
                        |response: &axum::response::Response,
                         latency: Duration,
                         _span: &tracing::Span| {
                            tracing::debug!(
                                status = %response.status(),
                                latency_ms = latency.as_millis(),
                                "Request completed"
                            );
                        },
                    ),
            )
            .layer(cors)
    }

    /// Run the server until a shutdown signal arrives.
    ///
    /// On SIGTERM or Ctrl+C the listener drains, the file watcher stops and
    /// a running reindex gets `shutdown_timeout` to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, the port cannot be
    /// bound or the server loop fails.
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| crate::Error::config(format!("invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(%addr, "Server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal(self.shutdown.clone()))
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        self.drain().await;
        tracing::info!("Server shut down gracefully");
        Ok(())
    }

    async fn drain(&self) {
        if let Some(watcher) = self.state.watcher.clone() {
            if let Err(e) = tokio::task::spawn_blocking(move || watcher.stop()).await {
                tracing::warn!(error = %e, "Watcher did not stop cleanly");
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        while self.state.indexing.is_running() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("Reindex still running at shutdown; abandoning it");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Wait for SIGTERM (Unix), Ctrl+C or `token`.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = token.cancelled() => {
            tracing::info!("Shutdown requested");
        }
    }
}
