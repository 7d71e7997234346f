use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, WorkflowTask};

/// A committed change to an order. `old_order` is `None` when the order has just been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderChangedEvent {
    pub old_order: Option<Order>,
    pub new_order: Order,
    pub timestamp: DateTime<Utc>,
}

impl OrderChangedEvent {
    pub fn created(order: Order) -> Self {
        Self { old_order: None, new_order: order, timestamp: Utc::now() }
    }

    pub fn modified(old_order: Order, new_order: Order) -> Self {
        Self { old_order: Some(old_order), new_order, timestamp: Utc::now() }
    }

    pub fn order_id(&self) -> &OrderId {
        &self.new_order.order_id
    }

    pub fn status_changed(&self) -> bool {
        self.old_order.as_ref().map(|o| o.status != self.new_order.status).unwrap_or(true)
    }
}

/// A task that failed permanently, after exhausting its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailedEvent {
    pub task: WorkflowTask,
    pub error: String,
}

impl TaskFailedEvent {
    pub fn new(task: WorkflowTask, error: String) -> Self {
        Self { task, error }
    }
}
