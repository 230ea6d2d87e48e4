use nodepool_client::ClientError;
use nodepool_types::{NodeMode, NodeRole};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no node for role '{role}' and mode '{mode}'")]
    NoClient { role: NodeRole, mode: NodeMode },

    #[error("tried to swap {role} to {mode}, but that client is not available in the pool")]
    NotAvailable { role: NodeRole, mode: NodeMode },

    #[error("{role} {mode} node is not a {expected} node")]
    WrongClientKind {
        role: NodeRole,
        mode: NodeMode,
        expected: &'static str,
    },

    #[error("no node connected for role '{0}'")]
    Unconnected(NodeRole),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl PoolError {
    /// Whether the caller asked for something the configuration does not
    /// provide, as opposed to a node failing at runtime.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoClient { .. }
                | Self::NotAvailable { .. }
                | Self::WrongClientKind { .. }
                | Self::Unconnected(_)
                | Self::Config(_)
        )
    }
}
