//! In-memory backend for controller and dispatcher tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lbsync_core::Inventory;
use lbsync_scheduler::{Backend, BackendError, BackendResult, JobId, JobStatus, OpKind, Operation};

use crate::controller::{ControllerOptions, PoolController};

/// Records submissions; jobs stay pending until the test settles them.
#[derive(Default)]
pub struct RecordingBackend {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    asynchronous: bool,
    inventory: Inventory,
    next_job: u64,
    submitted: Vec<Operation>,
    jobs: HashMap<JobId, (Operation, JobStatus)>,
    authenticated: bool,
    fail_auth: bool,
    /// Submissions with an operand containing this are refused.
    refuse: Option<String>,
}

impl RecordingBackend {
    pub fn synchronous() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn asynchronous() -> Arc<Self> {
        let backend = Self::default();
        backend.lock().asynchronous = true;
        Arc::new(backend)
    }

    pub fn with_inventory(inventory: Inventory) -> Arc<Self> {
        let backend = Self::default();
        backend.lock().inventory = inventory;
        Arc::new(backend)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_fail_auth(&self) {
        self.lock().fail_auth = true;
    }

    /// Fail `submit` with a transport error for operations naming `pattern`.
    pub fn refuse_submissions_matching(&self, pattern: &str) {
        self.lock().refuse = Some(pattern.to_string());
    }

    pub fn authenticated(&self) -> bool {
        self.lock().authenticated
    }

    pub fn submitted(&self) -> Vec<Operation> {
        self.lock().submitted.clone()
    }

    pub fn submitted_kinds(&self) -> Vec<OpKind> {
        self.lock().submitted.iter().map(Operation::kind).collect()
    }

    /// Settle every pending job of `kind`.
    pub fn settle(&self, kind: OpKind, status: JobStatus) {
        for (op, s) in self.lock().jobs.values_mut() {
            if op.kind() == kind && *s == JobStatus::Pending {
                *s = status;
            }
        }
    }

    pub fn complete_all(&self) {
        for (_, s) in self.lock().jobs.values_mut() {
            if *s == JobStatus::Pending {
                *s = JobStatus::Completed;
            }
        }
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn authenticate(&self) -> BackendResult<()> {
        let mut state = self.lock();
        if state.fail_auth {
            return Err(BackendError::Auth("bad credentials".into()));
        }
        state.authenticated = true;
        Ok(())
    }

    async fn inventory(&self) -> BackendResult<Inventory> {
        Ok(self.lock().inventory.clone())
    }

    async fn submit(&self, op: &Operation) -> BackendResult<Vec<JobId>> {
        let mut state = self.lock();
        if let Some(pattern) = &state.refuse {
            if op.operands().iter().any(|o| o.contains(pattern.as_str())) {
                return Err(BackendError::Transport("connection refused".into()));
            }
        }
        state.submitted.push(op.clone());
        if !state.asynchronous {
            return Ok(Vec::new());
        }
        state.next_job += 1;
        let job = JobId::new(format!("job-{}", state.next_job));
        state
            .jobs
            .insert(job.clone(), (op.clone(), JobStatus::Pending));
        Ok(vec![job])
    }

    async fn status(&self, job: &JobId) -> BackendResult<JobStatus> {
        self.lock()
            .jobs
            .get(job)
            .map(|(_, status)| *status)
            .ok_or_else(|| BackendError::Protocol(format!("unknown job {job}")))
    }
}

pub fn options(virtual_server: Option<&str>) -> ControllerOptions {
    ControllerOptions {
        virtual_server: virtual_server.map(str::to_string),
        call_timeout: Duration::from_secs(1),
    }
}

pub fn controller(backend: &Arc<RecordingBackend>, virtual_server: Option<&str>) -> PoolController {
    PoolController::new(backend.clone(), options(virtual_server))
}
