//! The node pool.
//!
//! Owns one client per configured `(role, mode)` slot, a connected pointer
//! per role, the failover controller that moves it, and the health monitor
//! and supervisor that decide when it should move.

pub mod config;
pub mod error;
pub mod failover;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod shutdown;
pub mod supervisor;

pub use config::{
    AdminSettings, BitcoinSettings, Credentials, HealthSettings, NodeEndpoints, PoolConfig,
    QueueSettings,
};
pub use error::PoolError;
pub use failover::{PoolWarning, WarningKind};
pub use health::{HealthMonitor, NodeCheckResult, NodeError};
pub use metrics::PoolMetrics;
pub use registry::{ConnectedNode, Connection, NodePool, PoolClient};
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use supervisor::{
    HealthReport, NodeState, PoolState, RoleState, Supervisor, SupervisorHandle,
};
