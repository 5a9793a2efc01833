//! Directory entries.

use lbsync_core::{Member, MonitorRecord, PoolRecord, RouteRecord};
use serde::{Deserialize, Serialize};

/// A pool and the members it is believed to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    /// Members in the order they were added.
    pub members: Vec<Member>,
    /// Health monitor the pool was created with, if any.
    pub monitor: Option<String>,
}

impl Pool {
    pub fn new(name: impl Into<String>, monitor: Option<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            monitor,
        }
    }

    pub fn has_member(&self, member: &Member) -> bool {
        self.members.contains(member)
    }
}

impl From<PoolRecord> for Pool {
    fn from(record: PoolRecord) -> Self {
        Self {
            name: record.name,
            members: record.members,
            monitor: record.monitor,
        }
    }
}

/// A routing rule sending a path prefix to a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    pub pool: String,
    pub path: String,
    /// Virtual server the route is attached to, if any.
    pub attached_to: Option<String>,
}

impl From<RouteRecord> for Route {
    fn from(record: RouteRecord) -> Self {
        Self {
            name: record.name,
            pool: record.pool,
            path: record.path,
            attached_to: record.attached_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub name: String,
    /// HTTP path the monitor probes.
    pub path: String,
    /// Response marker that means "up".
    pub up_code: String,
}

impl From<MonitorRecord> for Monitor {
    fn from(record: MonitorRecord) -> Self {
        Self {
            name: record.name,
            path: record.path,
            up_code: record.up_code,
        }
    }
}
