//! Member operations on one pool.

use lbsync_core::Member;
use lbsync_scheduler::{OpId, Operation};
use tracing::info;

use crate::controller::PoolController;
use crate::error::ControllerResult;

/// A pool borrowed from the controller for member changes.
///
/// Obtained through [`PoolController::pool`]. Membership is updated as soon
/// as the operation is queued.
pub struct PoolHandle<'a> {
    controller: &'a mut PoolController,
    name: String,
}

impl<'a> PoolHandle<'a> {
    pub(crate) fn new(controller: &'a mut PoolController, name: &str) -> Self {
        Self {
            controller,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members currently believed present, in the order they were added.
    pub fn members(&self) -> &[Member] {
        self.controller
            .directory
            .pool(&self.name)
            .map(|p| p.members.as_slice())
            .unwrap_or_default()
    }

    pub fn add_member(&mut self, address: &str, port: u16) -> ControllerResult<OpId> {
        let member = Member::new(address, port);
        let ctl = &mut *self.controller;
        ctl.directory.ensure_member_absent(&self.name, &member)?;

        let id = ctl
            .scheduler
            .enqueue_with_conflicts(Operation::add_member(&self.name, address, port))?;
        ctl.directory.add_member(&self.name, member.clone())?;
        info!(pool = %self.name, %member, %id, "member addition queued");
        Ok(id)
    }

    pub fn delete_member(&mut self, address: &str, port: u16) -> ControllerResult<OpId> {
        let member = Member::new(address, port);
        let ctl = &mut *self.controller;
        ctl.directory.ensure_member_present(&self.name, &member)?;

        let id = ctl
            .scheduler
            .enqueue_with_conflicts(Operation::delete_member(&self.name, address, port))?;
        ctl.directory.remove_member(&self.name, &member)?;
        info!(pool = %self.name, %member, %id, "member removal queued");
        Ok(id)
    }
}
