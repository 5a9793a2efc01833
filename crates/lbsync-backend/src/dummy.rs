//! Synchronous backend that only logs what it is asked to do.

use async_trait::async_trait;
use lbsync_core::Inventory;
use lbsync_scheduler::{Backend, BackendResult, JobId, JobStatus, OpKind, Operation};
use tracing::info;

#[derive(Debug, Default)]
pub struct DummyBackend;

impl DummyBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for DummyBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn authenticate(&self) -> BackendResult<()> {
        info!(backend = "dummy", "authenticate");
        Ok(())
    }

    async fn inventory(&self) -> BackendResult<Inventory> {
        info!(backend = "dummy", "inventory: nothing configured");
        Ok(Inventory::default())
    }

    async fn submit(&self, op: &Operation) -> BackendResult<Vec<JobId>> {
        let arg = |i: usize| op.operand(i).unwrap_or("-");
        match op.kind() {
            OpKind::CreatePool => {
                info!(backend = "dummy", pool = arg(0), monitor = arg(1), "create pool")
            }
            OpKind::DeletePool => info!(backend = "dummy", pool = arg(0), "delete pool"),
            OpKind::CreateRoute => info!(
                backend = "dummy",
                pool = arg(0),
                route = arg(1),
                path = arg(2),
                "create route"
            ),
            OpKind::AttachRoute => info!(
                backend = "dummy",
                route = arg(0),
                virtual_server = arg(1),
                "attach route"
            ),
            OpKind::DetachRoute => info!(
                backend = "dummy",
                route = arg(0),
                virtual_server = arg(1),
                "detach route"
            ),
            OpKind::DeleteRoute => {
                info!(backend = "dummy", pool = arg(0), route = arg(1), "delete route")
            }
            OpKind::CreateMonitor => info!(
                backend = "dummy",
                monitor = arg(0),
                path = arg(1),
                up_code = arg(2),
                "create monitor"
            ),
            OpKind::DeleteMonitor => info!(backend = "dummy", monitor = arg(0), "delete monitor"),
            OpKind::AddMember => info!(
                backend = "dummy",
                pool = arg(0),
                member = %format!("{}:{}", arg(1), arg(2)),
                "add member"
            ),
            OpKind::DeleteMember => info!(
                backend = "dummy",
                pool = arg(0),
                member = %format!("{}:{}", arg(1), arg(2)),
                "delete member"
            ),
        }
        Ok(Vec::new())
    }

    async fn status(&self, job: &JobId) -> BackendResult<JobStatus> {
        // Never handed out a job; anything asked about is long done.
        info!(backend = "dummy", %job, "job status");
        Ok(JobStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_operation_completes_synchronously() {
        let backend = DummyBackend::new();
        backend.authenticate().await.unwrap();
        assert!(backend.inventory().await.unwrap().is_empty());

        for op in [
            Operation::create_pool("p1", None),
            Operation::create_route("p1", "r1", "/app"),
            Operation::add_member("p1", "10.0.0.1", 8080),
            Operation::delete_member("p1", "10.0.0.1", 8080),
            Operation::delete_route("p1", "r1"),
            Operation::delete_pool("p1"),
        ] {
            assert!(backend.submit(&op).await.unwrap().is_empty(), "{op}");
        }
    }
}
