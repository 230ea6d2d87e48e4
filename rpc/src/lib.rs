//! Admin HTTP API for the node pool.
//!
//! Provides endpoints for:
//! - Forwarding raw JSON-RPC and CLI-style commands to a node
//! - Waiting for a transaction to confirm
//! - Manual failover between the active and passive node of a role
//! - Pool health and Prometheus metrics

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use handlers::AdminState;
pub use server::{router, AdminServer};
