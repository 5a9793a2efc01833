//! lbsync-scheduler: dependency-ordered operation scheduling.
//!
//! Load-balancer backends often accept a change, hand back job ids, and
//! only report completion when polled. The scheduler keeps every
//! outstanding [`Operation`] and decides what may be submitted now:
//!
//! - Operations that touch the same resource are chained by blocking
//!   edges, computed from the conflict table in [`conflict`]
//! - [`Scheduler::advance`] submits ready operations in enqueue order
//! - [`Scheduler::poll`] checks job status, reaps finished operations and
//!   unblocks their dependents
//! - A failed job cancels its operation and everything waiting on it
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── BTreeMap<OpId, ScheduledOp>   (enqueue order, sole owner)
//!   │     ├── blocked_on: usize       (unreaped blockers)
//!   │     ├── blocks: Vec<OpId>       (dependents, non-owning)
//!   │     └── job_ids: Vec<JobId>     (empty until submitted)
//!   └── dyn Backend (borrowed per call: submit / status)
//! ```
//!
//! Blockers must already be present when an operation is enqueued, so the
//! blocking relation can never contain a cycle.

pub mod backend;
pub mod conflict;
pub mod error;
pub mod operation;
pub mod scheduler;

pub use backend::{Backend, BackendError, BackendResult, JobId, JobStatus};
pub use error::{SchedulerError, SchedulerResult};
pub use operation::{OpId, OpKind, OpState, Operation, ScheduledOp};
pub use scheduler::{AdvanceReport, Cancellation, PollReport, Scheduler};
