//! Pool controller: validates requests against the directory and queues
//! the operations that carry them out.
//!
//! Each request checks the directory first, then enqueues, then records
//! the change, so a request that fails leaves both untouched. Directory
//! changes are optimistic: a pool is "present" as soon as its creation is
//! queued.

use std::sync::Arc;
use std::time::Duration;

use lbsync_core::LbsyncConfig;
use lbsync_directory::{Directory, Monitor, ResourceKind, Route};
use lbsync_scheduler::{
    AdvanceReport, Backend, OpId, OpKind, Operation, PollReport, Scheduler, SchedulerError,
    backend::with_timeout,
};
use tracing::{debug, info};

use crate::error::{ControllerError, ControllerResult};
use crate::pool::PoolHandle;

/// Settings that shape what the controller queues.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// When set, routes are attached to and detached from this virtual
    /// server as operations of their own.
    pub virtual_server: Option<String>,
    /// Bound on every backend call.
    pub call_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            virtual_server: None,
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl ControllerOptions {
    pub fn from_config(config: &LbsyncConfig) -> Self {
        Self {
            virtual_server: config.controller.virtual_server.clone(),
            call_timeout: config.daemon.call_timeout(),
        }
    }
}

/// Outcome of one [`PoolController::update`] cycle.
///
/// The poll half is always present; a submission failure during the
/// advance half is carried in `advance_error` instead of replacing it.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub poll: PollReport,
    pub advance: AdvanceReport,
    /// Set when advance stopped on a backend error. The failing operation
    /// stays ready for the next cycle.
    pub advance_error: Option<SchedulerError>,
}

/// Resource-facing API over the scheduler and directory.
pub struct PoolController {
    backend: Arc<dyn Backend>,
    pub(crate) directory: Directory,
    pub(crate) scheduler: Scheduler,
    options: ControllerOptions,
}

impl PoolController {
    /// A controller with an empty directory and no backend session.
    pub fn new(backend: Arc<dyn Backend>, options: ControllerOptions) -> Self {
        Self::with_directory(backend, Directory::new(), options)
    }

    pub fn with_directory(
        backend: Arc<dyn Backend>,
        directory: Directory,
        options: ControllerOptions,
    ) -> Self {
        Self {
            backend,
            directory,
            scheduler: Scheduler::new(),
            options,
        }
    }

    /// Authenticate against the backend and rebuild the directory from its
    /// inventory. The scheduler starts empty.
    pub async fn connect(
        backend: Arc<dyn Backend>,
        options: ControllerOptions,
    ) -> ControllerResult<Self> {
        let timeout = options.call_timeout;

        info!(backend = backend.name(), "authenticating");
        with_timeout(timeout, backend.authenticate()).await?;

        let inventory = with_timeout(timeout, backend.inventory()).await?;
        info!(
            backend = backend.name(),
            pools = inventory.pools.len(),
            members = inventory.member_count(),
            routes = inventory.routes.len(),
            monitors = inventory.monitors.len(),
            "inventory loaded"
        );
        for pool in &inventory.pools {
            debug!(pool = %pool.name, members = pool.members.len(), "existing pool");
        }

        let directory = Directory::from_inventory(inventory);
        Ok(Self::with_directory(backend, directory, options))
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn virtual_server(&self) -> Option<&str> {
        self.options.virtual_server.as_deref()
    }

    // ── Pools ──────────────────────────────────────────────────────

    pub fn create_pool(&mut self, name: &str, monitor: Option<&str>) -> ControllerResult<OpId> {
        self.directory.ensure_no_pool(name)?;

        let id = self
            .scheduler
            .enqueue_with_conflicts(Operation::create_pool(name, monitor))?;
        self.directory.insert_pool(name, monitor)?;
        info!(pool = name, monitor = monitor.unwrap_or("-"), %id, "pool creation queued");
        Ok(id)
    }

    pub fn delete_pool(&mut self, name: &str) -> ControllerResult<OpId> {
        self.directory.ensure_pool(name)?;
        let pending = self
            .scheduler
            .iter()
            .any(|s| s.kind() == OpKind::DeletePool && s.operation().operand(0) == Some(name));
        if pending {
            return Err(ControllerError::AlreadyPending(name.to_string()));
        }

        let id = self
            .scheduler
            .enqueue_with_conflicts(Operation::delete_pool(name))?;
        self.directory.remove_pool(name)?;
        info!(pool = name, %id, "pool deletion queued");
        Ok(id)
    }

    /// Borrow a pool for member operations.
    pub fn pool(&mut self, name: &str) -> ControllerResult<PoolHandle<'_>> {
        self.directory.ensure_pool(name)?;
        Ok(PoolHandle::new(self, name))
    }

    // ── Routes ─────────────────────────────────────────────────────

    /// Queue a route from `path` to `pool`, plus its attachment when a
    /// virtual server is configured. Returns the creation's handle.
    pub fn create_route(&mut self, pool: &str, route: &str, path: &str) -> ControllerResult<OpId> {
        self.directory.ensure_pool(pool)?;
        self.directory.ensure_no_route(route)?;

        let create = Operation::create_route(pool, route, path);
        let attach = self
            .options
            .virtual_server
            .as_deref()
            .map(|vs| Operation::attach_route(route, vs));
        validate(&create)?;
        if let Some(attach) = &attach {
            validate(attach)?;
        }

        let id = self.scheduler.enqueue_with_conflicts(create)?;
        if let Some(attach) = attach {
            let attach_id = self.scheduler.enqueue_with_conflicts(attach)?;
            debug!(route, %attach_id, "route attachment queued");
        }

        self.directory.insert_route(Route {
            name: route.to_string(),
            pool: pool.to_string(),
            path: path.to_string(),
            attached_to: self.options.virtual_server.clone(),
        })?;
        info!(pool, route, path, %id, "route creation queued");
        Ok(id)
    }

    /// Queue removal of a route, detaching it first when a virtual server
    /// is configured. Returns the deletion's handle.
    pub fn delete_route(&mut self, pool: &str, route: &str) -> ControllerResult<OpId> {
        self.directory.ensure_pool(pool)?;
        let owner = &self.directory.ensure_route(route)?.pool;
        if owner != pool {
            return Err(ControllerError::NotFound {
                kind: ResourceKind::Route,
                name: format!("{route} in pool {pool}"),
            });
        }

        let detach = self
            .options
            .virtual_server
            .as_deref()
            .map(|vs| Operation::detach_route(route, vs));
        let delete = Operation::delete_route(pool, route);
        if let Some(detach) = &detach {
            validate(detach)?;
        }
        validate(&delete)?;

        if let Some(detach) = detach {
            let detach_id = self.scheduler.enqueue_with_conflicts(detach)?;
            debug!(route, %detach_id, "route detachment queued");
        }
        let id = self.scheduler.enqueue_with_conflicts(delete)?;

        self.directory.remove_route(route)?;
        info!(pool, route, %id, "route deletion queued");
        Ok(id)
    }

    // ── Monitors ───────────────────────────────────────────────────

    pub fn create_monitor(&mut self, name: &str, path: &str, up_code: &str) -> ControllerResult<OpId> {
        self.directory.ensure_no_monitor(name)?;

        let id = self
            .scheduler
            .enqueue_with_conflicts(Operation::create_monitor(name, path, up_code))?;
        self.directory.insert_monitor(Monitor {
            name: name.to_string(),
            path: path.to_string(),
            up_code: up_code.to_string(),
        })?;
        info!(monitor = name, path, %id, "monitor creation queued");
        Ok(id)
    }

    pub fn delete_monitor(&mut self, name: &str) -> ControllerResult<OpId> {
        self.directory.ensure_monitor(name)?;

        let id = self
            .scheduler
            .enqueue_with_conflicts(Operation::delete_monitor(name))?;
        self.directory.remove_monitor(name)?;
        info!(monitor = name, %id, "monitor deletion queued");
        Ok(id)
    }

    // ── Driving the backend ────────────────────────────────────────

    /// Submit every ready operation.
    pub async fn advance(&mut self) -> ControllerResult<AdvanceReport> {
        let report = self
            .scheduler
            .advance(self.backend.as_ref(), self.options.call_timeout)
            .await?;
        Ok(report)
    }

    /// Check every outstanding job once.
    pub async fn poll(&mut self) -> PollReport {
        self.scheduler
            .poll(self.backend.as_ref(), self.options.call_timeout)
            .await
    }

    /// One control-loop cycle: poll, then advance, so operations unblocked
    /// by completions are submitted in the same cycle.
    pub async fn update(&mut self) -> UpdateReport {
        let poll = self.poll().await;
        let (advance, advance_error) = match self
            .scheduler
            .advance(self.backend.as_ref(), self.options.call_timeout)
            .await
        {
            Ok(report) => (report, None),
            Err(e) => (AdvanceReport::default(), Some(e)),
        };
        if !advance.submitted.is_empty()
            || poll.reaped > 0
            || !poll.cancellations.is_empty()
            || advance_error.is_some()
        {
            debug!(
                submitted = advance.submitted.len(),
                reaped = poll.reaped + advance.completed,
                cancelled = poll.cancelled(),
                advance_failed = advance_error.is_some(),
                outstanding = self.scheduler.len(),
                "update cycle"
            );
        }
        UpdateReport {
            poll,
            advance,
            advance_error,
        }
    }
}

fn validate(op: &Operation) -> ControllerResult<()> {
    op.validate()
        .map_err(|e| ControllerError::Scheduler(SchedulerError::InvalidOperation(e)))
}
