//! Scheduler error types.

use thiserror::Error;

use crate::backend::BackendError;
use crate::operation::OpId;

/// Errors that can occur while queueing or submitting operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(OpId),

    #[error("backend error submitting {op}: {source}")]
    Backend {
        op: String,
        #[source]
        source: BackendError,
    },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
