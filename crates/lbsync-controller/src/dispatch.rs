//! Lifecycle event dispatch.
//!
//! Maps each application event onto controller calls using names derived
//! from the configured templates:
//!
//! - `create_application`: optional monitor, then pool, then route `/<app>`
//! - `delete_application`: route, then pool (attempted even if the route
//!   deletion fails)
//! - `add_gear` / `delete_gear`: member change on the application's pool

use lbsync_core::config::NamingConfig;
use lbsync_core::{LifecycleEvent, ResourceNames};
use lbsync_directory::ResourceKind;
use lbsync_scheduler::OpId;
use tracing::{info, warn};

use crate::controller::PoolController;
use crate::error::{ControllerError, ControllerResult};

/// Turns lifecycle events into controller calls.
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    naming: NamingConfig,
}

impl EventDispatcher {
    pub fn new(naming: NamingConfig) -> Self {
        Self { naming }
    }

    pub fn names(&self, app_name: &str, namespace: &str) -> ResourceNames {
        ResourceNames::derive(&self.naming, app_name, namespace)
    }

    /// Handle one event. Returns the operations queued for it.
    ///
    /// On error, operations queued earlier for the same event stay queued.
    pub fn dispatch(
        &self,
        controller: &mut PoolController,
        event: &LifecycleEvent,
    ) -> ControllerResult<Vec<OpId>> {
        let names = self.names(event.app_name(), event.namespace());
        match event {
            LifecycleEvent::CreateApplication { app_name, .. } => {
                self.create_application(controller, app_name, &names)
            }
            LifecycleEvent::DeleteApplication { .. } => delete_application(controller, &names),
            LifecycleEvent::AddGear {
                public_address,
                public_port,
                ..
            } => {
                info!(pool = %names.pool, address = %public_address, port = public_port, "adding gear");
                let id = controller
                    .pool(&names.pool)?
                    .add_member(public_address, *public_port)?;
                Ok(vec![id])
            }
            LifecycleEvent::DeleteGear {
                public_address,
                public_port,
                ..
            } => {
                info!(pool = %names.pool, address = %public_address, port = public_port, "removing gear");
                let id = controller
                    .pool(&names.pool)?
                    .delete_member(public_address, *public_port)?;
                Ok(vec![id])
            }
        }
    }

    fn create_application(
        &self,
        controller: &mut PoolController,
        app_name: &str,
        names: &ResourceNames,
    ) -> ControllerResult<Vec<OpId>> {
        if controller.directory().contains_pool(&names.pool) {
            return Err(ControllerError::AlreadyExists {
                kind: ResourceKind::Pool,
                name: names.pool.clone(),
            });
        }

        let mut queued = Vec::new();
        let monitor = match (&names.monitor, &names.monitor_path) {
            (Some(monitor), _) if controller.directory().contains_monitor(monitor) => {
                info!(monitor = %monitor, "using existing monitor");
                Some(monitor.as_str())
            }
            (Some(monitor), Some(path)) => {
                info!(monitor = %monitor, path = %path, "creating monitor");
                queued.push(controller.create_monitor(
                    monitor,
                    path,
                    &self.naming.monitor_up_code,
                )?);
                Some(monitor.as_str())
            }
            _ => None,
        };

        info!(app = app_name, pool = %names.pool, "creating pool");
        queued.push(controller.create_pool(&names.pool, monitor)?);

        info!(route = %names.route, path = %names.route_path, pool = %names.pool, "creating route");
        queued.push(controller.create_route(&names.pool, &names.route, &names.route_path)?);
        Ok(queued)
    }
}

fn delete_application(
    controller: &mut PoolController,
    names: &ResourceNames,
) -> ControllerResult<Vec<OpId>> {
    if !controller.directory().contains_pool(&names.pool) {
        return Err(ControllerError::NotFound {
            kind: ResourceKind::Pool,
            name: names.pool.clone(),
        });
    }

    let mut queued = Vec::new();
    info!(route = %names.route, "deleting route");
    let route = controller.delete_route(&names.pool, &names.route);
    if let Ok(id) = &route {
        queued.push(*id);
    }

    info!(pool = %names.pool, "deleting pool");
    let pool = controller.delete_pool(&names.pool);
    if let Ok(id) = &pool {
        queued.push(*id);
    }

    match (route, pool) {
        (Err(route_err), pool_result) => {
            if let Err(pool_err) = pool_result {
                warn!(pool = %names.pool, error = %pool_err, "pool deletion also failed");
            }
            Err(route_err)
        }
        (Ok(_), Err(pool_err)) => Err(pool_err),
        (Ok(_), Ok(_)) => Ok(queued),
    }
}
