pub mod config;
pub mod event;
pub mod naming;
pub mod types;

pub use config::LbsyncConfig;
pub use event::LifecycleEvent;
pub use naming::ResourceNames;
pub use types::*;
