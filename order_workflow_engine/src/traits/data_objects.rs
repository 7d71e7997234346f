use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, Amount, Order, OrderId, OrderStatus, OrderType, Priority};

/// A request to move an order to a new status, as handed to the order store.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub order_id: OrderId,
    pub new_status: OrderStatus,
    pub actor: Actor,
    pub notes: Option<String>,
    pub reason: Option<String>,
}

impl StatusUpdate {
    pub fn new(order_id: OrderId, new_status: OrderStatus, actor: Actor) -> Self {
        Self { order_id, new_status, actor, notes: None, reason: None }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderChanged {
    pub old_order: Order,
    pub new_order: Order,
}

impl OrderChanged {
    pub fn new(old_order: Order, new_order: Order) -> Self {
        Self { old_order, new_order }
    }

    pub fn status_changed(&self) -> bool {
        self.old_order.status != self.new_order.status
    }
}

/// Field edits for an order that is still `Submitted`. Status is not editable here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifyOrderRequest {
    pub new_amount: Option<Amount>,
    /// Recompute the commission at this rate. When the amount changes without a new rate, the commission is
    /// rescaled at the order's existing effective rate.
    pub new_commission_rate_bps: Option<i64>,
    pub new_notes: Option<String>,
    pub new_priority: Option<Priority>,
    #[serde(default)]
    pub add_screenshots: Vec<String>,
}

impl ModifyOrderRequest {
    pub fn is_empty(&self) -> bool {
        self.new_amount.is_none()
            && self.new_commission_rate_bps.is_none()
            && self.new_notes.is_none()
            && self.new_priority.is_none()
            && self.add_screenshots.is_empty()
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.new_amount = Some(amount);
        self
    }

    pub fn with_commission_rate(mut self, bps: i64) -> Self {
        self.new_commission_rate_bps = Some(bps);
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.new_notes = Some(notes.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.new_priority = Some(priority);
        self
    }

    pub fn with_screenshot<S: Into<String>>(mut self, file_ref: S) -> Self {
        self.add_screenshots.push(file_ref.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub exchange_id: Option<String>,
    pub owner_id: Option<String>,
    pub order_type: Option<OrderType>,
    pub statuses: Vec<OrderStatus>,
    pub priority: Option<Priority>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_exchange_id<S: Into<String>>(mut self, exchange_id: S) -> Self {
        self.exchange_id = Some(exchange_id.into());
        self
    }

    pub fn with_owner_id<S: Into<String>>(mut self, owner_id: S) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.exchange_id.is_none()
            && self.owner_id.is_none()
            && self.order_type.is_none()
            && self.statuses.is_empty()
            && self.priority.is_none()
            && self.since.is_none()
            && self.until.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Amount,
    Priority,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSort {
    pub field: OrderSortField,
    pub direction: SortDirection,
}

impl OrderSort {
    pub fn new(field: OrderSortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Zero-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 500;

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 0, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size: page_size.clamp(1, MAX_PAGE_SIZE) }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    /// The number of orders matching the filter, across all pages
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl OrderPage {
    pub fn has_more(&self) -> bool {
        (i64::from(self.page) + 1) * i64::from(self.page_size) < self.total
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusCounts {
    pub pending: i64,
    pub executing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl TaskStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.executing + self.completed + self.failed + self.cancelled
    }
}

impl Display for TaskStatusCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} pending, {} executing, {} completed, {} failed, {} cancelled",
            self.pending, self.executing, self.completed, self.failed, self.cancelled
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pagination() {
        let p = Pagination::new(2, 10);
        assert_eq!(p.offset(), 20);
        assert_eq!(Pagination::new(0, 0).page_size, 1);
        assert_eq!(Pagination::new(0, 10_000).page_size, MAX_PAGE_SIZE);
        let page = OrderPage { orders: vec![], total: 21, page: 1, page_size: 10 };
        assert!(page.has_more());
        let page = OrderPage { orders: vec![], total: 20, page: 1, page_size: 10 };
        assert!(!page.has_more());
    }

    #[test]
    fn empty_requests() {
        assert!(ModifyOrderRequest::default().is_empty());
        assert!(!ModifyOrderRequest::default().with_notes("x").is_empty());
        assert!(OrderQueryFilter::default().is_empty());
        assert!(!OrderQueryFilter::default().with_status(OrderStatus::Submitted).is_empty());
    }
}
