//! Node pool registry.
//!
//! The pool is an arena of clients indexed by `(role, mode)`. The connected
//! pointer of each role holds a [`Connection`] (a mode, never a client
//! reference) inside a `tokio::sync::watch` channel: the failover controller
//! is its only writer, and any number of readers see either the old or the
//! new value.

use std::ops::Deref;
use std::sync::Arc;

use nodepool_client::{BitcoinClient, HttpTransport, LedgerClient, NodeClient, RpcTransport};
use nodepool_types::{NodeMode, NodeRole};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::failover::{initial_connection, PoolWarning};
use crate::metrics::PoolMetrics;
use crate::PoolError;

/// One configured pool slot.
#[derive(Clone)]
pub enum PoolClient {
    Bitcoin(Arc<BitcoinClient>),
    Ledger(Arc<LedgerClient>),
}

impl PoolClient {
    pub fn node(&self) -> &NodeClient {
        match self {
            Self::Bitcoin(client) => client.node(),
            Self::Ledger(client) => client.node(),
        }
    }

    pub fn as_bitcoin(&self) -> Option<&Arc<BitcoinClient>> {
        match self {
            Self::Bitcoin(client) => Some(client),
            Self::Ledger(_) => None,
        }
    }

    pub fn as_ledger(&self) -> Option<&Arc<LedgerClient>> {
        match self {
            Self::Ledger(client) => Some(client),
            Self::Bitcoin(_) => None,
        }
    }
}

impl Deref for PoolClient {
    type Target = NodeClient;

    fn deref(&self) -> &NodeClient {
        self.node()
    }
}

/// Where a role's connected pointer points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    Node(NodeMode),
    /// Neither mode of the role is configured.
    Unavailable,
}

impl Connection {
    pub fn mode(&self) -> Option<NodeMode> {
        match self {
            Self::Node(mode) => Some(*mode),
            Self::Unavailable => None,
        }
    }
}

type Slots = [[Option<PoolClient>; 2]; NodeRole::COUNT];

fn slot(slots: &Slots, role: NodeRole, mode: NodeMode) -> Option<&PoolClient> {
    slots[role.index()][mode.index()].as_ref()
}

/// Owner of every node client, plus the connected pointer per role.
pub struct NodePool {
    slots: Arc<Slots>,
    connected: [watch::Sender<Connection>; NodeRole::COUNT],
    warnings: Vec<PoolWarning>,
    metrics: Arc<PoolMetrics>,
}

impl NodePool {
    /// Build the pool over HTTP transports.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(config: &PoolConfig) -> Result<Self, PoolError> {
        let credentials = config.credentials.rpc();
        Self::with_transports(config, |_, _, url| {
            let transport = HttpTransport::new(url, credentials.clone())
                .map_err(|e| PoolError::Config(format!("cannot build HTTP client for {url}: {e}")))?;
            Ok(Arc::new(transport) as Arc<dyn RpcTransport>)
        })
    }

    /// Build the pool, asking `connect` for the transport of each configured
    /// slot.
    pub fn with_transports<F>(config: &PoolConfig, mut connect: F) -> Result<Self, PoolError>
    where
        F: FnMut(NodeRole, NodeMode, &str) -> Result<Arc<dyn RpcTransport>, PoolError>,
    {
        let mut slots: Slots = std::array::from_fn(|_| [None, None]);
        for role in NodeRole::ALL {
            for mode in NodeMode::ALL {
                let Some(url) = config.endpoint(role, mode) else {
                    continue;
                };
                let node = NodeClient::new(config.client_config(role, mode), connect(role, mode, url)?);
                let client = if role.is_bitcoin() {
                    PoolClient::Bitcoin(Arc::new(BitcoinClient::new(
                        node,
                        config.bitcoin.change_address.clone(),
                        config.bitcoin.allow_unconfirmed_utxos,
                    )))
                } else {
                    PoolClient::Ledger(Arc::new(LedgerClient::new(node)))
                };
                debug!(%role, %mode, endpoint = url, "node client created");
                slots[role.index()][mode.index()] = Some(client);
            }
        }

        let mut warnings = Vec::new();
        let connected = std::array::from_fn(|i| {
            let role = NodeRole::ALL[i];
            let (connection, warning) =
                initial_connection(role, slots[i][0].is_some(), slots[i][1].is_some());
            if let Some(warning) = warning {
                warn!(%role, "{warning}");
                warnings.push(warning);
            }
            watch::channel(connection).0
        });

        let pool = Self {
            slots: Arc::new(slots),
            connected,
            warnings,
            metrics: Arc::new(PoolMetrics::new()),
        };
        info!(
            nodes = pool.clients().count(),
            warnings = pool.warnings.len(),
            "node pool ready"
        );
        Ok(pool)
    }

    /// The client of one slot. Fails for unconfigured slots.
    pub fn get(&self, role: NodeRole, mode: NodeMode) -> Result<PoolClient, PoolError> {
        slot(&self.slots, role, mode)
            .cloned()
            .ok_or(PoolError::NoClient { role, mode })
    }

    pub fn bitcoin(&self, role: NodeRole, mode: NodeMode) -> Result<Arc<BitcoinClient>, PoolError> {
        self.get(role, mode)?
            .as_bitcoin()
            .cloned()
            .ok_or(PoolError::WrongClientKind {
                role,
                mode,
                expected: "bitcoin",
            })
    }

    pub fn ledger(&self, role: NodeRole, mode: NodeMode) -> Result<Arc<LedgerClient>, PoolError> {
        self.get(role, mode)?
            .as_ledger()
            .cloned()
            .ok_or(PoolError::WrongClientKind {
                role,
                mode,
                expected: "ledger",
            })
    }

    pub fn is_configured(&self, role: NodeRole, mode: NodeMode) -> bool {
        slot(&self.slots, role, mode).is_some()
    }

    /// Current value of the role's connected pointer.
    pub fn connection(&self, role: NodeRole) -> Connection {
        *self.connected[role.index()].borrow()
    }

    /// The client the role is connected to right now, if any.
    pub fn get_connected(&self, role: NodeRole) -> Option<PoolClient> {
        self.connection(role)
            .mode()
            .and_then(|mode| slot(&self.slots, role, mode).cloned())
    }

    /// Like [`get_connected`](Self::get_connected), failing when the role has
    /// no node.
    pub fn connected(&self, role: NodeRole) -> Result<PoolClient, PoolError> {
        self.get_connected(role).ok_or(PoolError::Unconnected(role))
    }

    /// A live handle on the role's connected pointer.
    pub fn subscribe(&self, role: NodeRole) -> ConnectedNode {
        ConnectedNode {
            role,
            rx: self.connected[role.index()].subscribe(),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Every configured slot, roles in sweep order, active before passive.
    pub fn clients(&self) -> impl Iterator<Item = (NodeRole, NodeMode, &PoolClient)> + '_ {
        NodeRole::ALL.into_iter().flat_map(move |role| {
            NodeMode::ALL
                .into_iter()
                .filter_map(move |mode| slot(&self.slots, role, mode).map(|c| (role, mode, c)))
        })
    }

    /// Gaps found while choosing the initial connections.
    pub fn warnings(&self) -> &[PoolWarning] {
        &self.warnings
    }

    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.metrics
    }

    /// Publish a new pointer value, returning the previous one. Readers are
    /// notified even when the value is unchanged.
    pub(crate) fn publish(&self, role: NodeRole, connection: Connection) -> Connection {
        self.connected[role.index()].send_replace(connection)
    }
}

/// Subscriber view of one role's connected pointer.
///
/// [`current`](Self::current) always resolves against the latest pointer
/// value, so a holder follows swaps without asking the pool again.
pub struct ConnectedNode {
    role: NodeRole,
    rx: watch::Receiver<Connection>,
    slots: Arc<Slots>,
}

impl ConnectedNode {
    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn connection(&self) -> Connection {
        *self.rx.borrow()
    }

    pub fn current(&self) -> Option<PoolClient> {
        self.connection()
            .mode()
            .and_then(|mode| slot(&self.slots, self.role, mode).cloned())
    }

    /// Wait for the next publish. `None` once the pool is gone.
    pub async fn changed(&mut self) -> Option<Connection> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
