//! Error types for the resource directory.

use std::fmt;

use lbsync_core::Member;
use thiserror::Error;

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// The kind of resource an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Pool,
    Route,
    Monitor,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Pool => "pool",
            ResourceKind::Route => "route",
            ResourceKind::Monitor => "monitor",
        })
    }
}

/// Errors that can occur when mutating the directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{member} is already a member of pool {pool}")]
    DuplicateMember { pool: String, member: Member },

    #[error("{member} is not a member of pool {pool}")]
    UnknownMember { pool: String, member: Member },
}

impl DirectoryError {
    pub(crate) fn exists(kind: ResourceKind, name: &str) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn missing(kind: ResourceKind, name: &str) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}
