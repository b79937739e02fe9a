//! HTTP server assembly.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{self, AppState};
use crate::error::Result;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ratelimit", post(handlers::ratelimit))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for the admission gateway.
pub struct HttpServer {
    addr: SocketAddr,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new server bound to `addr`.
    pub fn new(addr: SocketAddr, state: Arc<AppState>) -> Self {
        Self { addr, state }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server drains in-flight requests and returns when the provided
    /// signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state);
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await?;

        Ok(())
    }
}
