//! Health monitor.
//!
//! A sweep checks both nodes of every role concurrently. Each configured
//! node gets a bounded number of `getblockchaininfo` attempts; the result is
//! judged on its own (blocks trailing headers) and then against its pair
//! (header divergence between active and passive). Findings are returned as
//! [`NodeError`] values for alerting, never raised into request paths.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use nodepool_types::{ChainInfo, NodeMode, NodeRole};
use nodepool_utils::retry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HealthSettings;
use crate::registry::NodePool;

/// A health finding. `mode` is absent for pair-level findings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    pub message: String,
    pub role: NodeRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<NodeMode>,
}

impl NodeError {
    fn node(role: NodeRole, mode: NodeMode, message: String) -> Self {
        Self {
            message,
            role,
            mode: Some(mode),
        }
    }
}

/// Outcome of checking one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeCheckResult {
    pub errors: Vec<NodeError>,
    pub info: Option<ChainInfo>,
}

pub struct HealthMonitor {
    pool: Arc<NodePool>,
    retry_attempts: u32,
    retry_delay: Duration,
    max_block_lag: u64,
    max_header_divergence: u64,
}

impl HealthMonitor {
    pub fn new(pool: Arc<NodePool>, settings: &HealthSettings) -> Self {
        Self {
            pool,
            retry_attempts: settings.retry_attempts,
            retry_delay: settings.retry_delay(),
            max_block_lag: settings.max_block_lag,
            max_header_divergence: settings.max_header_divergence,
        }
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    /// Sweep every role. An empty result means every configured node is
    /// reachable, synced and consistent with its pair.
    pub async fn check_all(&self) -> Vec<NodeError> {
        let started = tokio::time::Instant::now();
        let errors: Vec<NodeError> = join_all(NodeRole::ALL.map(|role| self.check_role(role)))
            .await
            .into_iter()
            .flatten()
            .collect();

        let metrics = self.pool.metrics();
        metrics.sweep_seconds.observe(started.elapsed().as_secs_f64());
        for error in &errors {
            metrics.record_health_error(error.role);
        }
        debug!(errors = errors.len(), "health sweep finished");
        errors
    }

    /// Check both nodes of `role` concurrently, then compare them.
    pub async fn check_role(&self, role: NodeRole) -> Vec<NodeError> {
        let (active, passive) = tokio::join!(
            self.check_node(role, NodeMode::Active),
            self.check_node(role, NodeMode::Passive),
        );
        self.evaluate_pair(role, active, passive)
    }

    /// Check one node. An unconfigured slot yields no errors and no info.
    pub async fn check_node(&self, role: NodeRole, mode: NodeMode) -> NodeCheckResult {
        let Ok(client) = self.pool.get(role, mode) else {
            return NodeCheckResult::default();
        };

        match retry(self.retry_attempts, self.retry_delay, || client.get_info()).await {
            Ok(info) => {
                self.pool.metrics().record_chain_info(role, mode, &info);
                self.evaluate_node(role, mode, info)
            }
            Err(e) => {
                debug!(%role, %mode, error = %e, "node check failed");
                NodeCheckResult {
                    errors: vec![NodeError::node(
                        role,
                        mode,
                        format!("failed to get {role} {mode} node info"),
                    )],
                    info: None,
                }
            }
        }
    }

    fn evaluate_node(&self, role: NodeRole, mode: NodeMode, info: ChainInfo) -> NodeCheckResult {
        let mut errors = Vec::new();
        if info.lag() > self.max_block_lag {
            errors.push(NodeError::node(
                role,
                mode,
                format!(
                    "{role} {mode} node out of sync (blocks: {}, headers: {})",
                    info.blocks, info.headers
                ),
            ));
        }
        NodeCheckResult {
            errors,
            info: Some(info),
        }
    }

    fn evaluate_pair(
        &self,
        role: NodeRole,
        active: NodeCheckResult,
        passive: NodeCheckResult,
    ) -> Vec<NodeError> {
        let mut errors = active.errors;
        errors.extend(passive.errors);

        if let (Some(a), Some(p)) = (&active.info, &passive.info) {
            if a.headers.abs_diff(p.headers) > self.max_header_divergence {
                errors.push(NodeError {
                    message: format!(
                        "{role} nodes not in sync (active headers: {}, passive headers: {})",
                        a.headers, p.headers
                    ),
                    role,
                    mode: None,
                });
            }
        }
        errors
    }
}
