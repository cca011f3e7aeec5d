//! Read-only HTTP surface for the web layer's status pages.
//!
//! Provides two GET endpoints:
//! - `/api/simulation-stats`: roster counters
//! - `/api/simulation-status`: lifecycle state and lock ownership

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::sim::Simulator;
use crate::store::SqliteStore;

pub use types::{ErrorResponse, StatusResponse};

/// Application state shared across all request handlers.
pub struct AppState {
    /// The process's simulation service.
    pub simulator: Arc<Simulator<SqliteStore>>,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/simulation-stats", get(handlers::get_stats))
        .route("/api/simulation-status", get(handlers::get_status))
        .with_state(state)
}

/// Binds to the given address and serves the API until the listener fails.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server stops with an error.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
