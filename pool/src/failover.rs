//! Failover controller: initial connection choice and swaps.

use std::fmt;

use nodepool_types::{NodeMode, NodeRole};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::registry::{Connection, NodePool};
use crate::PoolError;

/// A gap found when the pool picks its initial connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PoolWarning {
    pub role: NodeRole,
    pub kind: WarningKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// Connected to active, nothing to fail over to.
    PassiveMissing,
    /// No active node; connected to passive instead.
    FallbackToPassive,
    /// Neither node configured; the role has no connection.
    Unconfigured,
}

impl fmt::Display for PoolWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = self.role;
        match self.kind {
            WarningKind::PassiveMissing => {
                write!(f, "node {role} passive is not available in the pool")
            }
            WarningKind::FallbackToPassive => write!(
                f,
                "node {role} active is not available in the pool, falling back to passive"
            ),
            WarningKind::Unconfigured => write!(
                f,
                "node {role} has neither an active nor a passive node in the pool"
            ),
        }
    }
}

/// Startup policy: prefer active, fall back to passive, else unavailable.
pub(crate) fn initial_connection(
    role: NodeRole,
    active: bool,
    passive: bool,
) -> (Connection, Option<PoolWarning>) {
    let warning = |kind| Some(PoolWarning { role, kind });
    match (active, passive) {
        (true, true) => (Connection::Node(NodeMode::Active), None),
        (true, false) => (
            Connection::Node(NodeMode::Active),
            warning(WarningKind::PassiveMissing),
        ),
        (false, true) => (
            Connection::Node(NodeMode::Passive),
            warning(WarningKind::FallbackToPassive),
        ),
        (false, false) => (Connection::Unavailable, warning(WarningKind::Unconfigured)),
    }
}

impl NodePool {
    /// Point `role` at its `mode` node and return where it pointed before.
    ///
    /// Fails, leaving the pointer untouched, when that slot is empty.
    /// Swapping to the current mode re-publishes the pointer. Calls already
    /// queued on the previous client still run there.
    pub fn swap(&self, role: NodeRole, mode: NodeMode) -> Result<Connection, PoolError> {
        if !self.is_configured(role, mode) {
            warn!(%role, %mode, "swap target is not available in the pool");
            return Err(PoolError::NotAvailable { role, mode });
        }

        let target = Connection::Node(mode);
        let previous = self.publish(role, target);
        if previous == target {
            debug!(%role, %mode, "swap to the connected node, pointer re-published");
        } else {
            info!(%role, from = ?previous.mode(), to = %mode, "swapped node");
            self.metrics().record_swap(role);
        }
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_configured_connects_active_silently() {
        let (connection, warning) = initial_connection(NodeRole::Dex, true, true);
        assert_eq!(connection, Connection::Node(NodeMode::Active));
        assert_eq!(warning, None);
    }

    #[test]
    fn only_passive_falls_back() {
        let (connection, warning) = initial_connection(NodeRole::Dex, false, true);
        assert_eq!(connection, Connection::Node(NodeMode::Passive));
        assert_eq!(warning.unwrap().kind, WarningKind::FallbackToPassive);
    }

    #[test]
    fn warning_text_names_the_role() {
        let (_, warning) = initial_connection(NodeRole::BtcInput, false, false);
        assert!(warning.unwrap().to_string().contains("btc-input"));
    }
}
