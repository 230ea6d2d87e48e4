//! Parse errors for the shared types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("unknown node role: {0}")]
    UnknownRole(String),

    #[error("unknown node mode: {0}")]
    UnknownMode(String),

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
