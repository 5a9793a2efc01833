//! Operations: one logical backend action plus its scheduling state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::JobId;

/// The logical backend actions the scheduler knows how to order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    CreatePool,
    DeletePool,
    CreateRoute,
    AttachRoute,
    DetachRoute,
    DeleteRoute,
    CreateMonitor,
    DeleteMonitor,
    AddMember,
    DeleteMember,
}

impl OpKind {
    pub const ALL: [OpKind; 10] = [
        OpKind::CreatePool,
        OpKind::DeletePool,
        OpKind::CreateRoute,
        OpKind::AttachRoute,
        OpKind::DetachRoute,
        OpKind::DeleteRoute,
        OpKind::CreateMonitor,
        OpKind::DeleteMonitor,
        OpKind::AddMember,
        OpKind::DeleteMember,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::CreatePool => "create_pool",
            OpKind::DeletePool => "delete_pool",
            OpKind::CreateRoute => "create_route",
            OpKind::AttachRoute => "attach_route",
            OpKind::DetachRoute => "detach_route",
            OpKind::DeleteRoute => "delete_route",
            OpKind::CreateMonitor => "create_monitor",
            OpKind::DeleteMonitor => "delete_monitor",
            OpKind::AddMember => "add_member",
            OpKind::DeleteMember => "delete_member",
        }
    }

    /// Accepted operand count, as `(min, max)`.
    ///
    /// | kind           | operands                      |
    /// |----------------|-------------------------------|
    /// | create_pool    | pool, [monitor]               |
    /// | delete_pool    | pool                          |
    /// | create_route   | pool, route, path             |
    /// | attach_route   | route, virtual server         |
    /// | detach_route   | route, virtual server         |
    /// | delete_route   | pool, route                   |
    /// | create_monitor | monitor, path, up marker      |
    /// | delete_monitor | monitor                       |
    /// | add_member     | pool, address, port           |
    /// | delete_member  | pool, address, port           |
    pub fn arity(&self) -> (usize, usize) {
        match self {
            OpKind::CreatePool => (1, 2),
            OpKind::DeletePool | OpKind::DeleteMonitor => (1, 1),
            OpKind::AttachRoute | OpKind::DetachRoute | OpKind::DeleteRoute => (2, 2),
            OpKind::CreateRoute
            | OpKind::CreateMonitor
            | OpKind::AddMember
            | OpKind::DeleteMember => (3, 3),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical backend action: a kind plus positional operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    kind: OpKind,
    operands: Vec<String>,
}

impl Operation {
    /// Build an operation from raw operands. The operand count is checked
    /// when the operation is enqueued, not here.
    pub fn new(kind: OpKind, operands: Vec<String>) -> Self {
        Self { kind, operands }
    }

    pub fn create_pool(pool: &str, monitor: Option<&str>) -> Self {
        let mut operands = vec![pool.to_string()];
        operands.extend(monitor.map(str::to_string));
        Self::new(OpKind::CreatePool, operands)
    }

    pub fn delete_pool(pool: &str) -> Self {
        Self::new(OpKind::DeletePool, vec![pool.to_string()])
    }

    pub fn create_route(pool: &str, route: &str, path: &str) -> Self {
        Self::new(
            OpKind::CreateRoute,
            vec![pool.to_string(), route.to_string(), path.to_string()],
        )
    }

    pub fn attach_route(route: &str, virtual_server: &str) -> Self {
        Self::new(
            OpKind::AttachRoute,
            vec![route.to_string(), virtual_server.to_string()],
        )
    }

    pub fn detach_route(route: &str, virtual_server: &str) -> Self {
        Self::new(
            OpKind::DetachRoute,
            vec![route.to_string(), virtual_server.to_string()],
        )
    }

    pub fn delete_route(pool: &str, route: &str) -> Self {
        Self::new(OpKind::DeleteRoute, vec![pool.to_string(), route.to_string()])
    }

    pub fn create_monitor(monitor: &str, path: &str, up_code: &str) -> Self {
        Self::new(
            OpKind::CreateMonitor,
            vec![monitor.to_string(), path.to_string(), up_code.to_string()],
        )
    }

    pub fn delete_monitor(monitor: &str) -> Self {
        Self::new(OpKind::DeleteMonitor, vec![monitor.to_string()])
    }

    pub fn add_member(pool: &str, address: &str, port: u16) -> Self {
        Self::new(
            OpKind::AddMember,
            vec![pool.to_string(), address.to_string(), port.to_string()],
        )
    }

    pub fn delete_member(pool: &str, address: &str, port: u16) -> Self {
        Self::new(
            OpKind::DeleteMember,
            vec![pool.to_string(), address.to_string(), port.to_string()],
        )
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn operands(&self) -> &[String] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Option<&str> {
        self.operands.get(index).map(String::as_str)
    }

    /// Check the operand count against the kind's layout.
    pub fn validate(&self) -> Result<(), String> {
        let (min, max) = self.kind.arity();
        let n = self.operands.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min}..={max}")
            };
            return Err(format!(
                "{} expects {expected} operands, got {n}",
                self.kind
            ));
        }
        if self.operands.iter().any(|o| o.is_empty()) {
            return Err(format!("{} has an empty operand", self.kind));
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.operands.join(", "))
    }
}

/// Handle to an operation owned by the scheduler. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub(crate) u64);

impl OpId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling status derived from an operation's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    /// Waiting on at least one unreaped blocker.
    Queued,
    /// No blockers left; not yet submitted.
    Ready,
    /// Submitted; the backend still holds job ids for it.
    InFlight,
}

/// An operation as held by the scheduler.
#[derive(Debug, Clone)]
pub struct ScheduledOp {
    pub(crate) id: OpId,
    pub(crate) op: Operation,
    pub(crate) blocked_on: usize,
    pub(crate) blocks: Vec<OpId>,
    pub(crate) job_ids: Vec<JobId>,
}

impl ScheduledOp {
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind
    }

    /// Number of unreaped operations this one still waits for.
    pub fn blocked_on(&self) -> usize {
        self.blocked_on
    }

    /// Operations waiting for this one.
    pub fn blocks(&self) -> &[OpId] {
        &self.blocks
    }

    pub fn job_ids(&self) -> &[JobId] {
        &self.job_ids
    }

    pub fn state(&self) -> OpState {
        if !self.job_ids.is_empty() {
            OpState::InFlight
        } else if self.blocked_on > 0 {
            OpState::Queued
        } else {
            OpState::Ready
        }
    }
}
