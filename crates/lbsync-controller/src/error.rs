//! Controller error types.

use lbsync_core::Member;
use lbsync_directory::{DirectoryError, ResourceKind};
use lbsync_scheduler::{BackendError, SchedulerError};
use thiserror::Error;

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors returned by controller and dispatcher calls.
///
/// Everything except `Scheduler` and `Backend` means the request did not
/// match the directory; the call made no changes.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("pool {0} is already being deleted")]
    AlreadyPending(String),

    #[error("{member} is already a member of pool {pool}")]
    DuplicateMember { pool: String, member: Member },

    #[error("{member} is not a member of pool {pool}")]
    UnknownMember { pool: String, member: Member },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<DirectoryError> for ControllerError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::AlreadyExists { kind, name } => Self::AlreadyExists { kind, name },
            DirectoryError::NotFound { kind, name } => Self::NotFound { kind, name },
            DirectoryError::DuplicateMember { pool, member } => {
                Self::DuplicateMember { pool, member }
            }
            DirectoryError::UnknownMember { pool, member } => Self::UnknownMember { pool, member },
        }
    }
}
