//! Client error types.

use std::time::Duration;

use nodepool_types::{Amount, NodeMode, NodeRole};
use serde_json::Value;
use thiserror::Error;

/// Failure talking to a node's JSON-RPC endpoint.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("HTTP status {status}")]
    Status { status: u16, body: Value },

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        /// The node's full reply, kept for operators.
        payload: Value,
    },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// The node's raw reply body, when it sent one.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Status { body, .. } => Some(body),
            Self::Rpc { payload, .. } => Some(payload),
            Self::Http(_) | Self::Decode(_) => None,
        }
    }

    /// Whether the reply could not be parsed. Such calls are worth retrying.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Http(format!("request timed out: {e}"))
        } else if e.is_connect() {
            Self::Http(format!("connection failed: {e}"))
        } else {
            Self::Http(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{role} {mode} node unavailable: {source}")]
    Unavailable {
        role: NodeRole,
        mode: NodeMode,
        #[source]
        source: TransportError,
    },

    #[error("node call exceeded {0:?}")]
    Timeout(Duration),

    #[error("wait for transaction {tx_id} timed out")]
    WaitTimedOut { tx_id: String },

    #[error("too many addresses in one transaction batch: {count}, allowed max {max}")]
    BatchTooLarge { count: usize, max: usize },

    #[error("fee {fee} exceeds amount {amount}")]
    FeeExceedsAmount { amount: Amount, fee: Amount },

    #[error("invalid fee rate {0} sat/vB")]
    InvalidFeeRate(f64),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("node not in sync by {lag} block(s)")]
    OutOfSync { lag: u64 },

    #[error("queued call panicked: {0}")]
    TaskPanicked(String),

    #[error("request queue was cleared")]
    QueueCleared,

    #[error("request queue closed")]
    QueueClosed,
}

impl ClientError {
    /// The underlying transport failure, for unavailable-node errors.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Unavailable { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether a caller retrying later could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. }
                | Self::Timeout(_)
                | Self::WaitTimedOut { .. }
                | Self::QueueCleared
        )
    }
}
