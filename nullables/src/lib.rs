//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies are abstracted behind traits; this crate provides
//! test-friendly implementations that:
//! - Return scripted, deterministic replies
//! - Record every call for assertions
//! - Never touch the network
//!
//! Usage: hand a [`NullTransport`] to a client in place of the HTTP transport.

pub mod transport;

pub use transport::{chain_info, wallet_tx, NullTransport, RecordedCall};
