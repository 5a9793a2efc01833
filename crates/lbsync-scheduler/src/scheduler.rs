//! Scheduler: owns outstanding operations and drives them through a backend.
//!
//! The `Scheduler` is a single-writer structure. The control loop that owns
//! it calls [`Scheduler::advance`] and [`Scheduler::poll`] on an interval;
//! nothing else mutates it concurrently.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::backend::{Backend, JobId, JobStatus, with_timeout};
use crate::conflict::blocks_on;
use crate::error::{SchedulerError, SchedulerResult};
use crate::operation::{OpId, OpState, Operation, ScheduledOp};

/// Outcome of one [`Scheduler::advance`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Operations handed to the backend, in submission order.
    pub submitted: Vec<OpId>,
    /// Of those, how many completed synchronously and were reaped.
    pub completed: usize,
}

/// A job failure and everything it took down with it.
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub job: JobId,
    /// The operation whose job failed.
    pub failed: Operation,
    /// Operations transitively waiting on `failed`, never submitted.
    pub dependents: Vec<Operation>,
}

/// Outcome of one [`Scheduler::poll`] pass.
#[derive(Debug, Default, Clone)]
pub struct PollReport {
    /// Status queries issued.
    pub queried: usize,
    /// Jobs still pending.
    pub pending: usize,
    /// Jobs that completed.
    pub completed_jobs: usize,
    /// Operations reaped because their last job completed.
    pub reaped: usize,
    /// Status queries that hit a transport error or timed out.
    pub transport_errors: usize,
    pub cancellations: Vec<Cancellation>,
}

impl PollReport {
    /// Total operations removed by cascading cancellation.
    pub fn cancelled(&self) -> usize {
        self.cancellations
            .iter()
            .map(|c| 1 + c.dependents.len())
            .sum()
    }
}

/// Dependency-ordered operation scheduler.
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Outstanding operations keyed by handle; handles grow monotonically,
    /// so iteration order is enqueue order.
    ops: BTreeMap<OpId, ScheduledOp>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation that must wait for every operation in `blockers`.
    ///
    /// Blockers must be outstanding operations of this scheduler, which
    /// keeps the blocking relation acyclic. Duplicate blockers count once.
    pub fn enqueue(&mut self, op: Operation, blockers: &[OpId]) -> SchedulerResult<OpId> {
        op.validate().map_err(SchedulerError::InvalidOperation)?;

        let mut unique: Vec<OpId> = Vec::with_capacity(blockers.len());
        for &blocker in blockers {
            if !self.ops.contains_key(&blocker) {
                return Err(SchedulerError::InvalidOperation(format!(
                    "{op} lists blocker {blocker}, which is not outstanding"
                )));
            }
            if !unique.contains(&blocker) {
                unique.push(blocker);
            }
        }

        let id = OpId(self.next_id);
        self.next_id += 1;

        for blocker in &unique {
            if let Some(entry) = self.ops.get_mut(blocker) {
                entry.blocks.push(id);
            }
        }

        debug!(%id, %op, blocked_on = unique.len(), "operation queued");

        self.ops.insert(
            id,
            ScheduledOp {
                id,
                op,
                blocked_on: unique.len(),
                blocks: Vec::new(),
                job_ids: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Outstanding operations that `op` conflicts with, in enqueue order.
    pub fn conflicting(&self, op: &Operation) -> Vec<OpId> {
        self.ops
            .values()
            .filter(|entry| blocks_on(op, &entry.op))
            .map(|entry| entry.id)
            .collect()
    }

    /// Enqueue `op` blocked on everything it conflicts with.
    pub fn enqueue_with_conflicts(&mut self, op: Operation) -> SchedulerResult<OpId> {
        let blockers = self.conflicting(&op);
        self.enqueue(op, &blockers)
    }

    /// Ready operations in enqueue order.
    pub fn ready(&self) -> Vec<OpId> {
        self.ops
            .values()
            .filter(|entry| entry.state() == OpState::Ready)
            .map(|entry| entry.id)
            .collect()
    }

    pub fn get(&self, id: OpId) -> Option<&ScheduledOp> {
        self.ops.get(&id)
    }

    /// Current state of an operation; `None` once it is reaped or cancelled.
    pub fn state(&self, id: OpId) -> Option<OpState> {
        self.ops.get(&id).map(ScheduledOp::state)
    }

    pub fn contains(&self, id: OpId) -> bool {
        self.ops.contains_key(&id)
    }

    /// Outstanding operations in enqueue order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledOp> {
        self.ops.values()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.ops
            .values()
            .filter(|entry| entry.state() == OpState::InFlight)
            .count()
    }

    /// Submit every operation that is ready at the start of the call.
    ///
    /// Operations are submitted in enqueue order. One that completes
    /// synchronously is reaped immediately; its dependents become ready for
    /// the next call. A transport error stops the pass and leaves the
    /// failing operation (and everything after it) ready for a retry.
    pub async fn advance(
        &mut self,
        backend: &dyn Backend,
        timeout: Duration,
    ) -> SchedulerResult<AdvanceReport> {
        let mut report = AdvanceReport::default();
        let ready = self.ready();
        if ready.is_empty() {
            return Ok(report);
        }

        for id in ready {
            let Some(entry) = self.ops.get(&id) else {
                continue;
            };
            let op = entry.op.clone();

            let job_ids = match with_timeout(timeout, backend.submit(&op)).await {
                Ok(job_ids) => job_ids,
                Err(source) => {
                    warn!(
                        backend = backend.name(),
                        %id,
                        %op,
                        error = %source,
                        "submission failed, operation stays queued"
                    );
                    return Err(SchedulerError::Backend {
                        op: op.to_string(),
                        source,
                    });
                }
            };

            report.submitted.push(id);

            if job_ids.is_empty() {
                info!(backend = backend.name(), %id, %op, "operation completed synchronously");
                self.reap(id);
                report.completed += 1;
                continue;
            }

            info!(
                backend = backend.name(),
                %id,
                %op,
                jobs = %join_jobs(&job_ids),
                "operation submitted"
            );
            if let Some(entry) = self.ops.get_mut(&id) {
                entry.job_ids = job_ids;
            }
        }

        Ok(report)
    }

    /// Query the status of every outstanding job once.
    ///
    /// Completed jobs are removed from their operation, which is reaped
    /// when its last job finishes. A failed job cancels its operation and
    /// every operation transitively waiting on it. Transport errors are
    /// logged and the job is queried again on the next call.
    pub async fn poll(&mut self, backend: &dyn Backend, timeout: Duration) -> PollReport {
        let mut report = PollReport::default();

        let jobs: Vec<(OpId, JobId)> = self
            .ops
            .values()
            .flat_map(|entry| entry.job_ids.iter().map(|job| (entry.id, job.clone())))
            .collect();

        for (id, job) in jobs {
            // An earlier job of this pass may have cancelled the operation.
            let outstanding = self
                .ops
                .get(&id)
                .is_some_and(|entry| entry.job_ids.contains(&job));
            if !outstanding {
                continue;
            }

            report.queried += 1;
            match with_timeout(timeout, backend.status(&job)).await {
                Ok(JobStatus::Pending) => {
                    trace!(%id, %job, "job pending");
                    report.pending += 1;
                }
                Ok(JobStatus::Completed) => {
                    debug!(backend = backend.name(), %id, %job, "job completed");
                    report.completed_jobs += 1;
                    if self.complete_job(id, &job) {
                        report.reaped += 1;
                    }
                }
                Ok(JobStatus::Failed) => {
                    let cancelled = self.cancel_cascade(id);
                    let mut cancelled = cancelled.into_iter();
                    if let Some(failed) = cancelled.next() {
                        let dependents: Vec<Operation> = cancelled.collect();
                        warn!(
                            backend = backend.name(),
                            %job,
                            op = %failed,
                            cancelled = %join_ops(&dependents),
                            "job failed, cancelled operation and its dependents"
                        );
                        report.cancellations.push(Cancellation {
                            job,
                            failed,
                            dependents,
                        });
                    }
                }
                Err(e) => {
                    warn!(backend = backend.name(), %id, %job, error = %e, "job status query failed");
                    report.transport_errors += 1;
                }
            }
        }

        report
    }

    /// Cancel an operation and everything transitively waiting on it.
    ///
    /// Returns the removed operations, `id` first. Nothing is sent to the
    /// backend; work already submitted is not rolled back.
    pub fn cancel(&mut self, id: OpId) -> SchedulerResult<Vec<Operation>> {
        if !self.ops.contains_key(&id) {
            return Err(SchedulerError::UnknownOperation(id));
        }
        let cancelled = self.cancel_cascade(id);
        info!(%id, cancelled = %join_ops(&cancelled), "operations cancelled");
        Ok(cancelled)
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Drop one finished job; reap the operation if it was the last one.
    fn complete_job(&mut self, id: OpId, job: &JobId) -> bool {
        let Some(entry) = self.ops.get_mut(&id) else {
            return false;
        };
        entry.job_ids.retain(|j| j != job);
        if !entry.job_ids.is_empty() {
            return false;
        }
        if let Some(op) = self.reap(id) {
            info!(%id, %op, "operation completed");
        }
        true
    }

    /// Remove a finished operation and release its dependents.
    fn reap(&mut self, id: OpId) -> Option<Operation> {
        let entry = self.ops.remove(&id)?;
        for dependent in &entry.blocks {
            // Dependents cancelled through another blocker are already gone.
            if let Some(dep) = self.ops.get_mut(dependent) {
                dep.blocked_on = dep.blocked_on.saturating_sub(1);
                if dep.blocked_on == 0 {
                    debug!(id = %dep.id, op = %dep.op, "operation unblocked");
                }
            }
        }
        Some(entry.op)
    }

    /// Remove `id` and everything reachable through `blocks`, depth first.
    fn cancel_cascade(&mut self, id: OpId) -> Vec<Operation> {
        let mut cancelled = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            // Diamonds reach the same dependent twice.
            let Some(entry) = self.ops.remove(&next) else {
                continue;
            };
            stack.extend(entry.blocks.iter().rev().copied());
            cancelled.push(entry.op);
        }
        cancelled
    }
}

fn join_jobs(jobs: &[JobId]) -> String {
    jobs.iter()
        .map(JobId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_ops(ops: &[Operation]) -> String {
    ops.iter()
        .map(Operation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
