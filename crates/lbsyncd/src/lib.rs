//! lbsyncd: the lbsync daemon.
//!
//! Reads application lifecycle events, turns them into load-balancer
//! operations, and drives those operations through the configured backend
//! on a single control loop.
//!
//! # Components
//!
//! - **`source`**: line-delimited JSON event reader (stdin or file)
//! - **`daemon`**: the control loop and its wiring from configuration
//! - **`logging`**: `tracing` subscriber setup from the `[log]` section

pub mod daemon;
pub mod logging;
pub mod source;

pub use daemon::{Daemon, RunSummary};
pub use source::EventSource;
