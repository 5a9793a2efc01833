//! lbsync-backend: load-balancer adapters behind the scheduler's
//! [`Backend`] trait.
//!
//! # Adapters
//!
//! ```text
//! from_config(&BackendConfig) -> Arc<dyn Backend>
//!   ├── dummy      synchronous; logs every call, holds nothing
//!   ├── simulated  in-memory job queue with latency and failure injection
//!   └── lbaas      REST job-queue API with keystone token authentication
//! ```
//!
//! Synchronous adapters return no job ids from `submit`; the scheduler
//! treats that as immediate completion.

pub mod dummy;
pub mod http;
pub mod lbaas;
pub mod simulated;

use std::sync::Arc;

use lbsync_core::config::BackendConfig;
use lbsync_scheduler::Backend;

pub use dummy::DummyBackend;
pub use lbaas::LbaasBackend;
pub use simulated::SimulatedBackend;

/// Build the adapter named by the configuration.
pub fn from_config(config: &BackendConfig) -> Arc<dyn Backend> {
    match config {
        BackendConfig::Dummy => Arc::new(DummyBackend::new()),
        BackendConfig::Simulated(sim) => Arc::new(SimulatedBackend::new(sim.clone())),
        BackendConfig::Lbaas(lbaas) => Arc::new(LbaasBackend::new(lbaas.clone())),
    }
}
