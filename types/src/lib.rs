//! Fundamental types for the node pool.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! node roles and modes, the chain tag, fixed-point amounts, timestamps, and the
//! records nodes return over JSON-RPC.

pub mod amount;
pub mod chain;
pub mod error;
pub mod network;
pub mod role;
pub mod time;

pub use amount::Amount;
pub use chain::{
    Block, ChainInfo, MempoolAcceptance, Payout, SendOutcome, TokenAmount, Utxo,
    WalletTransaction,
};
pub use error::TypesError;
pub use network::ChainTag;
pub use role::{NodeMode, NodeRole};
pub use time::Timestamp;
