//! lbsync-controller: resource-facing API over the scheduler.
//!
//! The [`PoolController`] turns "create this pool", "add this member" and
//! similar requests into scheduled operations with the right blocking
//! edges, and keeps the resource directory in step. The
//! [`EventDispatcher`] maps application lifecycle events onto those
//! requests using the configured name templates.
//!
//! # Components
//!
//! - **`controller`**: validation, enqueueing, and the poll/advance cycle
//! - **`pool`**: per-pool member operations through a borrowed handle
//! - **`dispatch`**: lifecycle event handling

pub mod controller;
pub mod dispatch;
pub mod error;
pub mod pool;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{ControllerOptions, PoolController, UpdateReport};
pub use dispatch::EventDispatcher;
pub use error::{ControllerError, ControllerResult};
pub use pool::PoolHandle;
