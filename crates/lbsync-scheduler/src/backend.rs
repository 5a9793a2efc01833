//! The backend capability the scheduler drives.
//!
//! A backend executes one logical operation per `submit` call and hands
//! back zero or more job ids. An empty list means the work is already done;
//! otherwise each job is polled through `status` until it completes or
//! fails. Synchronous load balancers are simply backends that always
//! return an empty list.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use lbsync_core::Inventory;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::Operation;

/// Opaque identifier of one unit of asynchronous backend work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a single job as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

/// Failures talking to a backend. None of these mean the backend rejected
/// the work itself; that is reported as [`JobStatus::Failed`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected HTTP status {code}: {body}")]
    Status { code: u16, body: String },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A load-balancer backend.
///
/// Implementations own any session state (tokens, connections) needed to
/// talk to the load balancer; callers only see this contract.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Establish a session. Called once at startup.
    async fn authenticate(&self) -> BackendResult<()>;

    /// Report the pools, routes and monitors the backend currently holds.
    async fn inventory(&self) -> BackendResult<Inventory>;

    /// Start executing `op`. An empty result means it already completed.
    async fn submit(&self, op: &Operation) -> BackendResult<Vec<JobId>>;

    /// Report the status of a job previously returned by `submit`.
    async fn status(&self, job: &JobId) -> BackendResult<JobStatus>;
}

/// Bound a backend call; an elapsed timer becomes [`BackendError::Timeout`].
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| BackendError::Timeout(timeout))?
}
