//! Status transition tables.
//!
//! Pure functions over `(current status, target status, role)`. The exchange role may only withdraw a fresh order or
//! ask for cancellation; everything that settles an order goes through an administrator.
use std::collections::BTreeSet;

use crate::db_types::{ActorRole, OrderStatus};

use OrderStatus::*;

const NONE: &[OrderStatus] = &[];

fn admin_targets(current: OrderStatus) -> &'static [OrderStatus] {
    match current {
        Submitted => &[Processing, Rejected, Cancelled],
        PendingReview => &[Processing, Rejected, Cancelled],
        Approved => &[Processing, Cancelled],
        Rejected => &[Processing],
        Processing => &[Completed, Cancelled],
        CancellationRequested => &[Cancelled, Processing],
        Completed | Cancelled => NONE,
    }
}

fn exchange_targets(current: OrderStatus) -> &'static [OrderStatus] {
    match current {
        Submitted => &[Cancelled],
        Approved => &[CancellationRequested],
        Processing => &[CancellationRequested],
        _ => NONE,
    }
}

/// The system principal has administrator privileges, plus the automated review edge used by auto-transitions.
fn system_targets(current: OrderStatus) -> &'static [OrderStatus] {
    match current {
        Submitted => &[Processing, Rejected, Cancelled, PendingReview],
        other => admin_targets(other),
    }
}

fn allowed_targets(current: OrderStatus, role: ActorRole) -> &'static [OrderStatus] {
    match role {
        ActorRole::Admin => admin_targets(current),
        ActorRole::Exchange => exchange_targets(current),
        ActorRole::System => system_targets(current),
    }
}

/// Returns true if an actor with the given role may move an order from `current` to `target`.
pub fn is_valid_transition(current: OrderStatus, target: OrderStatus, role: ActorRole) -> bool {
    allowed_targets(current, role).contains(&target)
}

/// Every status an actor with the given role may move an order to from `current`.
pub fn next_allowed_statuses(current: OrderStatus, role: ActorRole) -> BTreeSet<OrderStatus> {
    allowed_targets(current, role).iter().copied().collect()
}
