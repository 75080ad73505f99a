//! Web layer module
//!
//! The HTTP interface of the favicon service. Handlers are thin and delegate
//! to the [`FaviconResolver`] for all resolution logic.
//!
//! - `GET /s?url=..&skipCache=..`: resolve and serve an icon
//! - `GET /clear?url=..`: forget the cached icon of a domain
//! - `GET /`: status and request counters
//! - `GET /test`: diagnostic page for a list of sites
//! - `GET /health`: liveness

use anyhow::Result;
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::{config::Config, services::FaviconResolver};

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use responses::{ApiResponse, handle_error};

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<FaviconResolver>,
    /// Application start time for uptime calculation
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: Config, resolver: Arc<FaviconResolver>) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            start_time: chrono::Utc::now(),
        }
    }
}

impl WebServer {
    pub fn new(config: Config, resolver: Arc<FaviconResolver>) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        let app = create_router(AppState::new(config, resolver));
        Ok(Self { app, addr })
    }

    /// Start the web server
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }

    /// Serve until SIGTERM/SIGINT, reporting on `ready_signal` once bound
    pub async fn serve_with_signal(
        self,
        ready_signal: tokio::sync::oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => {
                let _ = ready_signal.send(Ok(()));

                axum::serve(listener, self.app)
                    .with_graceful_shutdown(shutdown_signal())
                    .await?;
                Ok(())
            }
            Err(bind_error) => {
                let bind_err_msg = format!("Failed to bind to {}: {}", self.addr, bind_error);
                let _ = ready_signal.send(Err(anyhow::anyhow!("{}", bind_err_msg)));
                Err(anyhow::anyhow!("{}", bind_err_msg))
            }
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Create the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::status::status))
        .route("/s", get(handlers::favicon::get_favicon))
        .route("/clear", get(handlers::favicon::clear_cache))
        .route("/test", get(handlers::test_page::test_page))
        .route("/health", get(handlers::health::health_check))
        // Middleware (applied in reverse order)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(
            middleware::request_logging_middleware,
        ))
        .with_state(state)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, shutting down gracefully");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully");
                    }
                }
            }
            _ => {
                tracing::warn!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down gracefully");
        }
    }
}
