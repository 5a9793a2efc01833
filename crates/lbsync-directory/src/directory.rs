//! Directory: typed create/remove/lookup over pools, routes, and monitors.
//!
//! Every mutating call validates first and leaves the directory untouched
//! when it fails. The `ensure_*` helpers run the same checks without
//! mutating, so a caller can validate, queue work elsewhere, and only then
//! commit the change.

use std::collections::BTreeMap;

use lbsync_core::{Inventory, Member};
use tracing::debug;

use crate::error::{DirectoryError, DirectoryResult, ResourceKind};
use crate::types::{Monitor, Pool, Route};

/// In-memory record of load-balancer resources.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pools: BTreeMap<String, Pool>,
    routes: BTreeMap<String, Route>,
    monitors: BTreeMap<String, Monitor>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the directory from what a backend reports.
    pub fn from_inventory(inventory: Inventory) -> Self {
        let mut dir = Self::new();
        for record in inventory.pools {
            dir.pools.insert(record.name.clone(), Pool::from(record));
        }
        for record in inventory.routes {
            dir.routes.insert(record.name.clone(), Route::from(record));
        }
        for record in inventory.monitors {
            dir.monitors.insert(record.name.clone(), Monitor::from(record));
        }
        debug!(
            pools = dir.pools.len(),
            routes = dir.routes.len(),
            monitors = dir.monitors.len(),
            "directory rebuilt from inventory"
        );
        dir
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty() && self.routes.is_empty() && self.monitors.is_empty()
    }

    // ── Pools ──────────────────────────────────────────────────────

    pub fn pool(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name)
    }

    pub fn contains_pool(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// Pools in name order.
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    pub fn ensure_pool(&self, name: &str) -> DirectoryResult<&Pool> {
        self.pools
            .get(name)
            .ok_or_else(|| DirectoryError::missing(ResourceKind::Pool, name))
    }

    pub fn ensure_no_pool(&self, name: &str) -> DirectoryResult<()> {
        if self.pools.contains_key(name) {
            return Err(DirectoryError::exists(ResourceKind::Pool, name));
        }
        Ok(())
    }

    /// Record a new, empty pool.
    pub fn insert_pool(&mut self, name: &str, monitor: Option<&str>) -> DirectoryResult<()> {
        self.ensure_no_pool(name)?;
        self.pools
            .insert(name.to_string(), Pool::new(name, monitor.map(str::to_string)));
        debug!(pool = name, "pool recorded");
        Ok(())
    }

    pub fn remove_pool(&mut self, name: &str) -> DirectoryResult<Pool> {
        let pool = self
            .pools
            .remove(name)
            .ok_or_else(|| DirectoryError::missing(ResourceKind::Pool, name))?;
        debug!(pool = name, members = pool.members.len(), "pool forgotten");
        Ok(pool)
    }

    // ── Members ────────────────────────────────────────────────────

    /// Check that `member` can be added to `pool`.
    pub fn ensure_member_absent(&self, pool: &str, member: &Member) -> DirectoryResult<()> {
        if self.ensure_pool(pool)?.has_member(member) {
            return Err(DirectoryError::DuplicateMember {
                pool: pool.to_string(),
                member: member.clone(),
            });
        }
        Ok(())
    }

    /// Check that `member` can be removed from `pool`.
    pub fn ensure_member_present(&self, pool: &str, member: &Member) -> DirectoryResult<()> {
        if !self.ensure_pool(pool)?.has_member(member) {
            return Err(DirectoryError::UnknownMember {
                pool: pool.to_string(),
                member: member.clone(),
            });
        }
        Ok(())
    }

    pub fn add_member(&mut self, pool: &str, member: Member) -> DirectoryResult<()> {
        self.ensure_member_absent(pool, &member)?;
        if let Some(entry) = self.pools.get_mut(pool) {
            debug!(pool, %member, "member recorded");
            entry.members.push(member);
        }
        Ok(())
    }

    pub fn remove_member(&mut self, pool: &str, member: &Member) -> DirectoryResult<()> {
        self.ensure_member_present(pool, member)?;
        if let Some(entry) = self.pools.get_mut(pool) {
            entry.members.retain(|m| m != member);
            debug!(pool, %member, "member forgotten");
        }
        Ok(())
    }

    // ── Routes ─────────────────────────────────────────────────────

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    pub fn contains_route(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Routes that forward to `pool`.
    pub fn routes_for_pool<'a>(&'a self, pool: &'a str) -> impl Iterator<Item = &'a Route> + 'a {
        self.routes.values().filter(move |r| r.pool == pool)
    }

    pub fn ensure_route(&self, name: &str) -> DirectoryResult<&Route> {
        self.routes
            .get(name)
            .ok_or_else(|| DirectoryError::missing(ResourceKind::Route, name))
    }

    pub fn ensure_no_route(&self, name: &str) -> DirectoryResult<()> {
        if self.routes.contains_key(name) {
            return Err(DirectoryError::exists(ResourceKind::Route, name));
        }
        Ok(())
    }

    pub fn insert_route(&mut self, route: Route) -> DirectoryResult<()> {
        self.ensure_no_route(&route.name)?;
        debug!(route = %route.name, pool = %route.pool, path = %route.path, "route recorded");
        self.routes.insert(route.name.clone(), route);
        Ok(())
    }

    pub fn remove_route(&mut self, name: &str) -> DirectoryResult<Route> {
        let route = self
            .routes
            .remove(name)
            .ok_or_else(|| DirectoryError::missing(ResourceKind::Route, name))?;
        debug!(route = name, "route forgotten");
        Ok(route)
    }

    // ── Monitors ───────────────────────────────────────────────────

    pub fn monitor(&self, name: &str) -> Option<&Monitor> {
        self.monitors.get(name)
    }

    pub fn contains_monitor(&self, name: &str) -> bool {
        self.monitors.contains_key(name)
    }

    pub fn monitors(&self) -> impl Iterator<Item = &Monitor> {
        self.monitors.values()
    }

    pub fn ensure_no_monitor(&self, name: &str) -> DirectoryResult<()> {
        if self.monitors.contains_key(name) {
            return Err(DirectoryError::exists(ResourceKind::Monitor, name));
        }
        Ok(())
    }

    pub fn ensure_monitor(&self, name: &str) -> DirectoryResult<&Monitor> {
        self.monitors
            .get(name)
            .ok_or_else(|| DirectoryError::missing(ResourceKind::Monitor, name))
    }

    pub fn insert_monitor(&mut self, monitor: Monitor) -> DirectoryResult<()> {
        self.ensure_no_monitor(&monitor.name)?;
        debug!(monitor = %monitor.name, path = %monitor.path, "monitor recorded");
        self.monitors.insert(monitor.name.clone(), monitor);
        Ok(())
    }

    pub fn remove_monitor(&mut self, name: &str) -> DirectoryResult<Monitor> {
        let monitor = self
            .monitors
            .remove(name)
            .ok_or_else(|| DirectoryError::missing(ResourceKind::Monitor, name))?;
        debug!(monitor = name, "monitor forgotten");
        Ok(monitor)
    }
}
