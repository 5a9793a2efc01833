//! Blocking rules between operations on the same resource.
//!
//! A new operation must wait for every outstanding operation it conflicts
//! with. Operand positions follow [`OpKind::arity`](crate::OpKind::arity);
//! operand 0 is the pool name for pool, route and member operations.
//!
//! | new operation              | waits for an outstanding                          |
//! |----------------------------|---------------------------------------------------|
//! | create_pool(p, m)          | delete_pool(p), create_monitor(m)                 |
//! | delete_pool(p)             | create_pool(p), delete_route(p, _), delete_member(p, _, _) |
//! | create_route(p, r)         | create_pool(p)                                    |
//! | attach_route(r)            | create_route(_, r)                                |
//! | detach_route(r)            | attach_route(r), detach_route(r)                  |
//! | delete_route(p, r)         | detach_route(r), create_pool(p), create_route(p, r) |
//! | create_monitor(m)          | delete_monitor(m)                                 |
//! | delete_monitor(m)          | create_monitor(m)                                 |
//! | add/delete_member(p, a, n) | create_pool(p), add/delete_member(p, a, n)        |
//!
//! Waiting on deletes and creates is enough to order the rest: a
//! `delete_pool` that follows `create_route` already waits through the
//! route's `delete_route`, and a re-create waits on the pending delete.

use crate::operation::{OpKind, Operation};

/// Whether `new` must wait for `existing` to be reaped before it submits.
pub fn blocks_on(new: &Operation, existing: &Operation) -> bool {
    use OpKind::*;

    let n = |i: usize| new.operand(i);
    let e = |i: usize| existing.operand(i);

    match (new.kind(), existing.kind()) {
        (CreatePool, DeletePool) => same(n(0), e(0)),
        (CreatePool, CreateMonitor) => same(n(1), e(0)),

        (DeletePool, CreatePool | DeleteRoute | DeleteMember) => same(n(0), e(0)),

        (CreateRoute, CreatePool) => same(n(0), e(0)),

        (AttachRoute, CreateRoute) => same(n(0), e(1)),

        (DetachRoute, AttachRoute | DetachRoute) => same(n(0), e(0)),

        (DeleteRoute, DetachRoute) => same(n(1), e(0)),
        (DeleteRoute, CreatePool) => same(n(0), e(0)),
        (DeleteRoute, CreateRoute) => same(n(0), e(0)) && same(n(1), e(1)),

        (CreateMonitor, DeleteMonitor) | (DeleteMonitor, CreateMonitor) => same(n(0), e(0)),

        (AddMember | DeleteMember, CreatePool) => same(n(0), e(0)),
        (AddMember | DeleteMember, AddMember | DeleteMember) => {
            same(n(0), e(0)) && same(n(1), e(1)) && same(n(2), e(2))
        }

        _ => false,
    }
}

/// Both operands present and equal.
fn same(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}
