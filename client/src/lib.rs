//! Serialized JSON-RPC clients for blockchain nodes.
//!
//! A [`NodeClient`] wraps one node endpoint and funnels every call through
//! its own [`CallQueue`], so calls against one node never overlap. The
//! [`BitcoinClient`] and [`LedgerClient`] add chain-specific spends on top
//! while keeping the same queuing, unlock and error behaviour.

pub mod bitcoin;
pub mod command;
pub mod error;
pub mod ledger;
pub mod node;
pub mod queue;
pub mod transport;

pub use bitcoin::{estimate_fee, BitcoinClient, TX_VSIZE_ESTIMATE};
pub use command::CliCommand;
pub use error::{ClientError, TransportError};
pub use ledger::{AccountHistoryEntry, LedgerClient, TokenBalance, MAX_TOKEN_BATCH};
pub use node::{
    NodeClient, NodeClientConfig, DEFAULT_TX_WAIT, DEFAULT_UNLOCK_SECS, MAX_UTXO_BATCH,
    TX_POLL_INTERVAL,
};
pub use queue::{CallQueue, DEFAULT_CALL_TIMEOUT};
pub use transport::{HttpTransport, RpcCredentials, RpcFuture, RpcTransport};
