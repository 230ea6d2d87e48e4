//! Health supervisor: periodic sweeps and automatic failover.
//!
//! Every tick runs [`HealthMonitor::check_all`], folds the findings into a
//! [`PoolState`] and compares it with the previous one. Transitions are
//! logged once, a role whose every configured node is down is reported
//! once per outage, and the connected pointer follows the first healthy
//! node (active before passive).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use nodepool_types::{NodeMode, NodeRole, Timestamp};
use nodepool_utils::format_duration;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::HealthSettings;
use crate::health::{HealthMonitor, NodeError};
use crate::registry::{Connection, NodePool};
use crate::shutdown::ShutdownSignal;

const REPORT_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeState {
    pub is_down: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_since: Option<Timestamp>,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoleState {
    pub connection: Connection,
    /// Configured modes only.
    pub nodes: BTreeMap<NodeMode, NodeState>,
}

impl RoleState {
    pub fn node(&self, mode: NodeMode) -> Option<&NodeState> {
        self.nodes.get(&mode)
    }

    /// First node that is up, active before passive.
    pub fn preferred(&self) -> Option<NodeMode> {
        self.nodes
            .iter()
            .find(|(_, node)| !node.is_down)
            .map(|(mode, _)| *mode)
    }

    fn any_up(&self) -> bool {
        self.nodes.values().any(|node| !node.is_down)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PoolState(BTreeMap<NodeRole, RoleState>);

impl PoolState {
    pub fn role(&self, role: NodeRole) -> Option<&RoleState> {
        self.0.get(&role)
    }
}

/// Outcome of one supervised sweep.
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub checked_at: Timestamp,
    pub errors: Vec<NodeError>,
    pub state: PoolState,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Cheap, cloneable access to the supervisor's output.
#[derive(Clone)]
pub struct SupervisorHandle {
    latest: watch::Receiver<Option<Arc<HealthReport>>>,
    reports: broadcast::Sender<Arc<HealthReport>>,
}

impl SupervisorHandle {
    /// The most recent report, `None` before the first sweep finishes.
    pub fn latest(&self) -> Option<Arc<HealthReport>> {
        self.latest.borrow().clone()
    }

    /// Receive every report published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<HealthReport>> {
        self.reports.subscribe()
    }
}

pub struct Supervisor {
    monitor: HealthMonitor,
    interval: Duration,
    auto_swap: bool,
    state: Option<PoolState>,
    latest: watch::Sender<Option<Arc<HealthReport>>>,
    reports: broadcast::Sender<Arc<HealthReport>>,
}

impl Supervisor {
    pub fn new(pool: Arc<NodePool>, settings: &HealthSettings) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            monitor: HealthMonitor::new(pool, settings),
            interval: settings.interval(),
            auto_swap: settings.auto_swap,
            state: None,
            latest: watch::channel(None).0,
            reports,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            latest: self.latest.subscribe(),
            reports: self.reports.clone(),
        }
    }

    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Sweep immediately, then once per interval until shutdown.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "health supervisor started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
        info!("health supervisor stopped");
    }

    /// Run one sweep, act on it and publish the report.
    pub async fn sweep(&mut self) -> Arc<HealthReport> {
        let errors = self.monitor.check_all().await;
        let now = Timestamp::now();

        let roles = NodeRole::ALL
            .into_iter()
            .map(|role| (role, self.update_role(role, &errors, now)))
            .collect();
        let state = PoolState(roles);
        self.state = Some(state.clone());

        let report = Arc::new(HealthReport {
            checked_at: now,
            errors,
            state,
        });
        self.latest.send_replace(Some(Arc::clone(&report)));
        // Nobody listening is fine.
        let _ = self.reports.send(Arc::clone(&report));
        report
    }

    fn update_role(&self, role: NodeRole, errors: &[NodeError], now: Timestamp) -> RoleState {
        let pool = self.monitor.pool();
        let previous = self.state.as_ref().and_then(|state| state.role(role));

        let mut nodes = BTreeMap::new();
        for mode in NodeMode::ALL {
            let Ok(client) = pool.get(role, mode) else {
                continue;
            };
            let messages: Vec<String> = errors
                .iter()
                .filter(|e| e.role == role && e.mode == Some(mode))
                .map(|e| e.message.clone())
                .collect();
            let before = previous.and_then(|p| p.node(mode));
            let node = next_node_state(before, messages, now);

            match (before.map(|b| b.is_down), node.is_down) {
                (None | Some(false), true) => {
                    error!(%role, %mode, errors = ?node.errors, "node is down")
                }
                (Some(true), false) => {
                    let down_for = before
                        .and_then(|b| b.down_since)
                        .map(|since| format_duration(Duration::from_secs(since.elapsed_since(now))))
                        .unwrap_or_default();
                    info!(%role, %mode, down_for = %down_for, "node is up");
                }
                _ => {}
            }

            let metrics = pool.metrics();
            metrics.record_down(role, mode, node.is_down);
            metrics.record_queue_depth(role, mode, client.queue_len());
            nodes.insert(mode, node);
        }

        let mut current = RoleState {
            connection: pool.connection(role),
            nodes,
        };
        if current.nodes.is_empty() {
            return current;
        }

        if !current.any_up() {
            if previous.map_or(true, RoleState::any_up) {
                error!(%role, "role is fully down, no node to fail over to");
            }
            return current;
        }

        if !self.auto_swap {
            return current;
        }
        let Some(preferred) = current.preferred() else {
            return current;
        };
        if current.connection.mode() == Some(preferred) {
            return current;
        }

        let old = current.connection.mode();
        match pool.swap(role, preferred) {
            Ok(_) => {
                warn!(%role, from = ?old, to = %preferred, "automatic failover");
                if let Some(old) = old {
                    if current.node(old).is_some_and(|node| node.is_down) {
                        if let Ok(client) = pool.get(role, old) {
                            client.clear_queue();
                        }
                    }
                }
            }
            Err(e) => warn!(%role, to = %preferred, error = %e, "automatic failover failed"),
        }
        current.connection = pool.connection(role);
        current
    }
}

fn next_node_state(before: Option<&NodeState>, errors: Vec<String>, now: Timestamp) -> NodeState {
    let is_down = !errors.is_empty();
    let down_since = match before {
        _ if !is_down => None,
        Some(prev) if prev.is_down => prev.down_since,
        _ => Some(now),
    };
    NodeState {
        is_down,
        down_since,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(since: u64) -> NodeState {
        NodeState {
            is_down: true,
            down_since: Some(Timestamp::new(since)),
            errors: vec!["failed".into()],
        }
    }

    #[test]
    fn down_since_survives_a_continued_outage() {
        let next = next_node_state(Some(&down(100)), vec!["still".into()], Timestamp::new(160));
        assert_eq!(next.down_since, Some(Timestamp::new(100)));
    }

    #[test]
    fn down_since_starts_on_a_new_outage() {
        let next = next_node_state(None, vec!["failed".into()], Timestamp::new(42));
        assert!(next.is_down);
        assert_eq!(next.down_since, Some(Timestamp::new(42)));
    }

    #[test]
    fn recovery_clears_down_since() {
        let next = next_node_state(Some(&down(100)), Vec::new(), Timestamp::new(160));
        assert_eq!(
            next,
            NodeState {
                is_down: false,
                down_since: None,
                errors: Vec::new()
            }
        );
    }

    #[test]
    fn preferred_is_first_up_node() {
        let up = NodeState {
            is_down: false,
            down_since: None,
            errors: Vec::new(),
        };
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeMode::Passive, up.clone());
        nodes.insert(NodeMode::Active, down(1));
        let state = RoleState {
            connection: Connection::Node(NodeMode::Active),
            nodes,
        };
        assert_eq!(state.preferred(), Some(NodeMode::Passive));

        let mut both_up = state.clone();
        both_up.nodes.insert(NodeMode::Active, up);
        assert_eq!(both_up.preferred(), Some(NodeMode::Active));
    }
}
