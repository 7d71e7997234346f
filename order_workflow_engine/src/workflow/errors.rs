use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{ActorRole, OrderId, OrderStatus, TaskStatus},
    traits::OrderStoreError,
};

/// Errors returned to callers of the [`crate::WorkflowEngine`].
///
/// Validation errors (`OrderNotFound`, `InvalidTransition`, `TaskAlreadyActive`, `OrderNotEditable`) are raised before
/// anything is stored.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Invalid status transition from {from} to {to} for role {role}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus, role: ActorRole },
    #[error("Order {order_id} already has an active workflow task (#{task_id})")]
    TaskAlreadyActive { order_id: OrderId, task_id: i64 },
    #[error("Order {0} cannot be edited because its status is {1}")]
    OrderNotEditable(OrderId, OrderStatus),
    #[error("The requested order change would result in a no-op.")]
    NothingToModify,
    #[error("Workflow task {0} does not exist")]
    TaskNotFound(i64),
    #[error("Workflow task {id} is {status} and cannot be {action}")]
    TaskStateConflict { id: i64, status: TaskStatus, action: &'static str },
    #[error("Storage error: {0}")]
    StorageError(OrderStoreError),
}

impl From<OrderStoreError> for WorkflowError {
    fn from(e: OrderStoreError) -> Self {
        match e {
            OrderStoreError::OrderNotFound(id) => WorkflowError::OrderNotFound(id),
            OrderStoreError::InvalidTransition { from, to, role } => WorkflowError::InvalidTransition { from, to, role },
            OrderStoreError::OrderNotEditable(id, status) => WorkflowError::OrderNotEditable(id, status),
            OrderStoreError::OrderModificationNoOp => WorkflowError::NothingToModify,
            OrderStoreError::TaskNotFound(id) => WorkflowError::TaskNotFound(id),
            OrderStoreError::TaskStatusMismatch { id, actual, .. } => {
                WorkflowError::TaskStateConflict { id, status: actual, action: "updated" }
            },
            e => WorkflowError::StorageError(e),
        }
    }
}

/// Why a single task attempt failed. Every variant is transient: the attempt is retried while retries remain.
#[derive(Debug, Clone, Error)]
pub enum TaskExecutionError {
    #[error("Dependency task #{0} does not exist")]
    DependencyMissing(i64),
    #[error("Dependency task #{id} is {status}, not completed")]
    DependencyNotMet { id: i64, status: TaskStatus },
    #[error("Condition not met: {0}")]
    ConditionFailed(String),
    #[error("Task execution timed out after {}ms", .0.num_milliseconds())]
    TimedOut(Duration),
    #[error("{0}")]
    Store(#[from] OrderStoreError),
}
