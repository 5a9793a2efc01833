//! In-memory asynchronous backend.
//!
//! Every submission becomes one job `job-<n>`. A job reports `Pending` for
//! `completes_after` status queries, then settles: `Failed` if any operand
//! contains one of the `fail_matching` substrings, `Completed` otherwise.
//! A settled status is reported once; the job is forgotten afterwards.
//! Completed operations are applied to an in-memory model that
//! [`Backend::inventory`] reports, so a restart against the same instance
//! sees what earlier work built.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use lbsync_core::config::SimulatedConfig;
use lbsync_core::{Inventory, Member, MonitorRecord, PoolRecord, RouteRecord};
use lbsync_scheduler::{Backend, BackendError, BackendResult, JobId, JobStatus, OpKind, Operation};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct SimJob {
    op: Operation,
    polls: u32,
    fails: bool,
}

#[derive(Debug, Default)]
struct SimState {
    next_job: u64,
    jobs: HashMap<JobId, SimJob>,
    pools: BTreeMap<String, PoolRecord>,
    routes: BTreeMap<String, RouteRecord>,
    monitors: BTreeMap<String, MonitorRecord>,
    submissions: u64,
}

/// Asynchronous backend that keeps its load balancer in memory.
pub struct SimulatedBackend {
    config: SimulatedConfig,
    state: Mutex<SimState>,
}

impl SimulatedBackend {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Start from an existing set of resources.
    pub fn with_inventory(config: SimulatedConfig, inventory: Inventory) -> Self {
        let mut state = SimState::default();
        for pool in inventory.pools {
            state.pools.insert(pool.name.clone(), pool);
        }
        for route in inventory.routes {
            state.routes.insert(route.name.clone(), route);
        }
        for monitor in inventory.monitors {
            state.monitors.insert(monitor.name.clone(), monitor);
        }
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Number of operations submitted so far.
    pub async fn submissions(&self) -> u64 {
        self.state.lock().await.submissions
    }

    /// Jobs that have not settled yet.
    pub async fn pending_jobs(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    fn should_fail(&self, op: &Operation) -> bool {
        self.config
            .fail_matching
            .iter()
            .any(|pattern| op.operands().iter().any(|o| o.contains(pattern.as_str())))
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn authenticate(&self) -> BackendResult<()> {
        debug!("simulated backend needs no authentication");
        Ok(())
    }

    async fn inventory(&self) -> BackendResult<Inventory> {
        let state = self.state.lock().await;
        Ok(Inventory {
            pools: state.pools.values().cloned().collect(),
            routes: state.routes.values().cloned().collect(),
            monitors: state.monitors.values().cloned().collect(),
        })
    }

    async fn submit(&self, op: &Operation) -> BackendResult<Vec<JobId>> {
        let fails = self.should_fail(op);
        let mut state = self.state.lock().await;
        state.submissions += 1;
        state.next_job += 1;
        let job = JobId::new(format!("job-{}", state.next_job));
        state.jobs.insert(
            job.clone(),
            SimJob {
                op: op.clone(),
                polls: 0,
                fails,
            },
        );
        debug!(%job, %op, fails, "simulated job accepted");
        Ok(vec![job])
    }

    async fn status(&self, job: &JobId) -> BackendResult<JobStatus> {
        let mut state = self.state.lock().await;
        let entry = state
            .jobs
            .get_mut(job)
            .ok_or_else(|| BackendError::Protocol(format!("unknown job {job}")))?;

        if entry.polls < self.config.completes_after {
            entry.polls += 1;
            return Ok(JobStatus::Pending);
        }

        let status = if entry.fails {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        let op = entry.op.clone();
        state.jobs.remove(job);

        if status == JobStatus::Completed {
            apply(&mut state, &op);
            info!(%job, %op, "simulated job completed");
        } else {
            warn!(%job, %op, "simulated job failed");
        }
        Ok(status)
    }
}

/// Apply a completed operation to the model.
fn apply(state: &mut SimState, op: &Operation) {
    let arg = |i: usize| op.operand(i).unwrap_or_default().to_string();
    match op.kind() {
        OpKind::CreatePool => {
            let name = arg(0);
            state.pools.insert(
                name.clone(),
                PoolRecord {
                    name,
                    members: Vec::new(),
                    monitor: op.operand(1).map(str::to_string),
                },
            );
        }
        OpKind::DeletePool => {
            state.pools.remove(&arg(0));
        }
        OpKind::CreateRoute => {
            let name = arg(1);
            state.routes.insert(
                name.clone(),
                RouteRecord {
                    name,
                    pool: arg(0),
                    path: arg(2),
                    attached_to: None,
                },
            );
        }
        OpKind::AttachRoute => {
            if let Some(route) = state.routes.get_mut(&arg(0)) {
                route.attached_to = Some(arg(1));
            }
        }
        OpKind::DetachRoute => {
            if let Some(route) = state.routes.get_mut(&arg(0)) {
                route.attached_to = None;
            }
        }
        OpKind::DeleteRoute => {
            state.routes.remove(&arg(1));
        }
        OpKind::CreateMonitor => {
            let name = arg(0);
            state.monitors.insert(
                name.clone(),
                MonitorRecord {
                    name,
                    path: arg(1),
                    up_code: arg(2),
                },
            );
        }
        OpKind::DeleteMonitor => {
            state.monitors.remove(&arg(0));
        }
        OpKind::AddMember | OpKind::DeleteMember => {
            let Ok(port) = arg(2).parse::<u16>() else {
                warn!(%op, "member operation with invalid port ignored");
                return;
            };
            let member = Member::new(arg(1), port);
            if let Some(pool) = state.pools.get_mut(&arg(0)) {
                if op.kind() == OpKind::AddMember {
                    if !pool.members.contains(&member) {
                        pool.members.push(member);
                    }
                } else {
                    pool.members.retain(|m| *m != member);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(completes_after: u32, fail_matching: &[&str]) -> SimulatedBackend {
        SimulatedBackend::new(SimulatedConfig {
            completes_after,
            fail_matching: fail_matching.iter().map(|s| s.to_string()).collect(),
        })
    }

    async fn run_to_completion(backend: &SimulatedBackend, op: Operation) -> JobStatus {
        let jobs = backend.submit(&op).await.unwrap();
        assert_eq!(jobs.len(), 1);
        loop {
            match backend.status(&jobs[0]).await.unwrap() {
                JobStatus::Pending => continue,
                settled => return settled,
            }
        }
    }

    #[tokio::test]
    async fn job_stays_pending_for_configured_polls() {
        let backend = backend(2, &[]);
        let jobs = backend
            .submit(&Operation::create_pool("p1", None))
            .await
            .unwrap();
        assert_eq!(jobs, vec![JobId::new("job-1")]);

        assert_eq!(backend.status(&jobs[0]).await.unwrap(), JobStatus::Pending);
        assert_eq!(backend.status(&jobs[0]).await.unwrap(), JobStatus::Pending);
        assert_eq!(backend.status(&jobs[0]).await.unwrap(), JobStatus::Completed);
        assert_eq!(backend.pending_jobs().await, 0);
    }

    #[tokio::test]
    async fn zero_latency_completes_on_first_poll() {
        let backend = backend(0, &[]);
        let jobs = backend
            .submit(&Operation::create_pool("p1", None))
            .await
            .unwrap();
        assert_eq!(backend.status(&jobs[0]).await.unwrap(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn matching_operands_fail() {
        let backend = backend(1, &["broken"]);
        let status = run_to_completion(&backend, Operation::create_pool("pool_broken", None)).await;
        assert_eq!(status, JobStatus::Failed);

        let status = run_to_completion(&backend, Operation::create_pool("pool_ok", None)).await;
        assert_eq!(status, JobStatus::Completed);

        let inventory = backend.inventory().await.unwrap();
        let names: Vec<&str> = inventory.pools.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["pool_ok"]);
    }

    #[tokio::test]
    async fn completed_work_shows_up_in_inventory() {
        let backend = backend(0, &[]);
        for op in [
            Operation::create_monitor("m1", "/health", "1"),
            Operation::create_pool("p1", Some("m1")),
            Operation::create_route("p1", "r1", "/app"),
            Operation::attach_route("r1", "vs"),
            Operation::add_member("p1", "10.0.0.1", 8080),
            Operation::add_member("p1", "10.0.0.2", 8080),
            Operation::delete_member("p1", "10.0.0.1", 8080),
        ] {
            assert_eq!(run_to_completion(&backend, op).await, JobStatus::Completed);
        }

        let inventory = backend.inventory().await.unwrap();
        assert_eq!(inventory.pools.len(), 1);
        assert_eq!(inventory.pools[0].monitor.as_deref(), Some("m1"));
        assert_eq!(inventory.pools[0].members, vec![Member::new("10.0.0.2", 8080)]);
        assert_eq!(inventory.routes[0].attached_to.as_deref(), Some("vs"));
        assert_eq!(inventory.monitors[0].up_code, "1");
        assert_eq!(backend.submissions().await, 7);
    }

    #[tokio::test]
    async fn pending_work_is_not_applied() {
        let backend = backend(5, &[]);
        backend
            .submit(&Operation::create_pool("p1", None))
            .await
            .unwrap();
        assert!(backend.inventory().await.unwrap().is_empty());
        assert_eq!(backend.pending_jobs().await, 1);
    }

    #[tokio::test]
    async fn settled_jobs_are_forgotten() {
        let backend = backend(0, &["broken"]);
        let done = backend
            .submit(&Operation::create_pool("p1", None))
            .await
            .unwrap();
        let failed = backend
            .submit(&Operation::create_pool("p_broken", None))
            .await
            .unwrap();
        assert_eq!(backend.pending_jobs().await, 2);

        assert_eq!(backend.status(&done[0]).await.unwrap(), JobStatus::Completed);
        assert_eq!(backend.status(&failed[0]).await.unwrap(), JobStatus::Failed);
        assert_eq!(backend.pending_jobs().await, 0);
        assert!(matches!(
            backend.status(&done[0]).await,
            Err(BackendError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn unknown_job_is_a_protocol_error() {
        let backend = backend(0, &[]);
        let err = backend.status(&JobId::new("job-99")).await.unwrap_err();
        assert!(matches!(err, BackendError::Protocol(_)));
    }

    #[tokio::test]
    async fn seeded_inventory_is_reported() {
        let backend = SimulatedBackend::with_inventory(
            SimulatedConfig::default(),
            Inventory {
                pools: vec![PoolRecord {
                    name: "p1".into(),
                    members: vec![Member::new("10.0.0.1", 80)],
                    monitor: None,
                }],
                ..Inventory::default()
            },
        );
        let inventory = backend.inventory().await.unwrap();
        assert_eq!(inventory.member_count(), 1);
    }
}
