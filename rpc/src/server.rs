//! Axum-based admin server.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::{middleware, Router};
use nodepool_pool::ShutdownSignal;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::handlers::{self, AdminState};

/// Build the admin router. Every route sits behind the bearer token.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/node/health", get(handlers::health))
        .route("/node/:role/rpc", post(handlers::rpc))
        .route("/node/:role/cmd", post(handlers::cmd))
        .route("/node/:role/tx/:tx_id", get(handlers::wait_tx))
        .route("/node/:role/:mode/rpc", post(handlers::rpc_on))
        .route("/node/:role/:mode/cmd", post(handlers::cmd_on))
        .route("/node/:role/:mode/tx/:tx_id", get(handlers::wait_tx_on))
        .route("/node/:role/:mode/swap", post(handlers::swap))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct AdminServer {
    addr: SocketAddr,
    state: AdminState,
}

impl AdminServer {
    pub fn new(addr: SocketAddr, state: AdminState) -> Self {
        Self { addr, state }
    }

    /// Serve until `shutdown` fires.
    pub async fn serve(self, mut shutdown: ShutdownSignal) -> Result<(), ApiError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ApiError::Internal(format!("cannot bind {}: {e}", self.addr)))?;
        info!(addr = %self.addr, "admin server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        info!("admin server stopped");
        Ok(())
    }
}
