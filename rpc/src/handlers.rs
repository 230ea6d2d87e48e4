//! Admin request handlers.
//!
//! Routes without a mode act on the role's connected node; routes with one
//! act on that exact pool slot.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nodepool_client::DEFAULT_TX_WAIT;
use nodepool_pool::{
    Connection, HealthMonitor, HealthReport, NodePool, PoolClient, SupervisorHandle,
};
use nodepool_types::{NodeMode, NodeRole, Timestamp, WalletTransaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;

/// Shared state of the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub pool: Arc<NodePool>,
    pub monitor: Arc<HealthMonitor>,
    pub supervisor: Option<SupervisorHandle>,
    pub token: Option<Arc<str>>,
}

impl AdminState {
    fn connected(&self, role: &str) -> Result<PoolClient, ApiError> {
        Ok(self.pool.connected(parse_role(role)?)?)
    }

    fn slot(&self, role: &str, mode: &str) -> Result<PoolClient, ApiError> {
        Ok(self.pool.get(parse_role(role)?, parse_mode(mode)?)?)
    }
}

fn parse_role(role: &str) -> Result<NodeRole, ApiError> {
    role.parse().map_err(|_| ApiError::BadPath(format!("unknown node role '{role}'")))
}

fn parse_mode(mode: &str) -> Result<NodeMode, ApiError> {
    mode.parse().map_err(|_| ApiError::BadPath(format!("unknown node mode '{mode}'")))
}

// ── Forwarding ───────────────────────────────────────────────────────────

pub async fn rpc(
    State(state): State<AdminState>,
    Path(role): Path<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    forward_rpc(state.connected(&role)?, body).await
}

pub async fn rpc_on(
    State(state): State<AdminState>,
    Path((role, mode)): Path<(String, String)>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    forward_rpc(state.slot(&role, &mode)?, body).await
}

async fn forward_rpc(client: PoolClient, body: String) -> Result<Json<Value>, ApiError> {
    client
        .send_raw_command(body)
        .await
        .map(Json)
        .map_err(ApiError::Rpc)
}

#[derive(Debug, Default, Deserialize)]
pub struct CmdQuery {
    #[serde(default)]
    pub no_auto_unlock: bool,
}

pub async fn cmd(
    State(state): State<AdminState>,
    Path(role): Path<String>,
    Query(query): Query<CmdQuery>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    forward_cmd(state.connected(&role)?, &body, query.no_auto_unlock).await
}

pub async fn cmd_on(
    State(state): State<AdminState>,
    Path((role, mode)): Path<(String, String)>,
    Query(query): Query<CmdQuery>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    forward_cmd(state.slot(&role, &mode)?, &body, query.no_auto_unlock).await
}

async fn forward_cmd(
    client: PoolClient,
    line: &str,
    no_auto_unlock: bool,
) -> Result<Json<Value>, ApiError> {
    client
        .send_cli_command(line.trim(), no_auto_unlock)
        .await
        .map(Json)
        .map_err(ApiError::Command)
}

// ── Confirmation wait ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    /// Overrides the default wait of ten minutes.
    pub timeout_ms: Option<u64>,
}

impl WaitQuery {
    fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TX_WAIT)
    }
}

pub async fn wait_tx(
    State(state): State<AdminState>,
    Path((role, tx_id)): Path<(String, String)>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<WalletTransaction>, ApiError> {
    let client = state.connected(&role)?;
    Ok(Json(client.wait_for_transaction(&tx_id, query.timeout()).await?))
}

pub async fn wait_tx_on(
    State(state): State<AdminState>,
    Path((role, mode, tx_id)): Path<(String, String, String)>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<WalletTransaction>, ApiError> {
    let client = state.slot(&role, &mode)?;
    Ok(Json(client.wait_for_transaction(&tx_id, query.timeout()).await?))
}

// ── Failover ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SwapResponse {
    pub role: NodeRole,
    pub previous: Connection,
    pub connected: Connection,
}

pub async fn swap(
    State(state): State<AdminState>,
    Path((role, mode)): Path<(String, String)>,
) -> Result<Json<SwapResponse>, ApiError> {
    let (role, mode) = (parse_role(&role)?, parse_mode(&mode)?);
    let previous = state.pool.swap(role, mode)?;
    info!(%role, %mode, "manual swap requested");
    Ok(Json(SwapResponse {
        role,
        previous,
        connected: state.pool.connection(role),
    }))
}

// ── Health and metrics ───────────────────────────────────────────────────

/// The supervisor's last report, or a fresh sweep when there is none yet.
pub async fn health(State(state): State<AdminState>) -> Response {
    if let Some(report) = state.supervisor.as_ref().and_then(SupervisorHandle::latest) {
        return Json(HealthReport::clone(&report)).into_response();
    }
    let errors = state.monitor.check_all().await;
    Json(json!({ "checked_at": Timestamp::now(), "errors": errors })).into_response()
}

pub async fn metrics(State(state): State<AdminState>) -> Result<impl IntoResponse, ApiError> {
    let text = state
        .pool
        .metrics()
        .encode()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}
