//! lbsync-directory: the resource directory.
//!
//! Records the pools (with their members), routes, and health monitors the
//! daemon believes exist on the load balancer. Entries change as soon as
//! an operation is queued, not when the backend confirms it, so the
//! directory always reflects intended state.
//!
//! Nothing is persisted. At startup the directory is rebuilt from the
//! backend's [`Inventory`](lbsync_core::Inventory).

pub mod directory;
pub mod error;
pub mod types;

pub use directory::Directory;
pub use error::{DirectoryError, DirectoryResult, ResourceKind};
pub use types::*;
