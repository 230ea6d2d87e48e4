//! Shared utilities for the node pool.

pub mod logging;
pub mod retry;
pub mod time;

pub use logging::{init_logging, LogFormat};
pub use retry::retry;
pub use time::format_duration;
