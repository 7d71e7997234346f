use thiserror::Error;

use crate::{
    db_types::{ActorRole, NewOrder, Order, OrderId, OrderStatus, TaskStatus, WorkflowAction},
    traits::data_objects::{ModifyOrderRequest, OrderChanged, OrderPage, OrderQueryFilter, OrderSort, Pagination, StatusUpdate},
};

/// The `OrderManagement` trait is the order store adapter used by the workflow engine.
///
/// Orders are the single shared mutable resource of the workflow. Every status write goes through
/// [`OrderManagement::update_order_status`], which must read the live status, re-validate the transition and write the
/// result in one atomic transaction. This is what keeps two tasks scheduled against the same stale status from both
/// succeeding.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// Fetches the order with the given public order id. If it does not exist, `None` is returned.
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError>;

    /// Stores a new order with status `Submitted`.
    ///
    /// The order id is allocated in the same transaction from the monthly sequence counter, so concurrent submissions
    /// never receive the same id.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError>;

    /// Atomically changes the status of an order.
    ///
    /// * The current status is read inside the transaction and the transition re-validated for the actor's role.
    /// * The status, `updated` milestone and a milestone for the new status are written.
    /// * A [`WorkflowAction`] audit record is appended.
    ///
    /// Returns the order before and after the change.
    async fn update_order_status(&self, update: StatusUpdate) -> Result<OrderChanged, OrderStoreError>;

    /// Edits the free-form fields of an order. Only orders that are still `Submitted` may be edited.
    async fn modify_order(&self, order_id: &OrderId, update: ModifyOrderRequest) -> Result<OrderChanged, OrderStoreError>;

    /// Lists orders that match the filter, sorted and paginated.
    async fn search_orders(
        &self,
        filter: OrderQueryFilter,
        sort: OrderSort,
        pagination: Pagination,
    ) -> Result<OrderPage, OrderStoreError>;

    /// The status-change audit trail for an order, oldest first.
    async fn fetch_workflow_actions(&self, order_id: &OrderId) -> Result<Vec<WorkflowAction>, OrderStoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderStoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Invalid status transition from {from} to {to} for role {role}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus, role: ActorRole },
    #[error("Order {0} cannot be edited because its status is {1}")]
    OrderNotEditable(OrderId, OrderStatus),
    #[error("The requested order change would result in a no-op.")]
    OrderModificationNoOp,
    #[error("Order {0} was changed by someone else while it was being updated")]
    ConcurrentModification(OrderId),
    #[error("The requested workflow task {0} does not exist")]
    TaskNotFound(i64),
    #[error("Order {0} already has a pending or executing workflow task")]
    TaskAlreadyActive(OrderId),
    #[error("Workflow task {id} is {actual}, but the update requires it to be {expected}")]
    TaskStatusMismatch { id: i64, expected: TaskStatus, actual: TaskStatus },
    #[error("The requested notification {0} does not exist")]
    NotificationNotFound(i64),
    #[error("Could not convert a stored value. {0}")]
    ConversionError(String),
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        OrderStoreError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for OrderStoreError {
    fn from(e: serde_json::Error) -> Self {
        OrderStoreError::ConversionError(e.to_string())
    }
}
