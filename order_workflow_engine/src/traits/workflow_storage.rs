use crate::{
    db_types::{
        NewNotification,
        NewWorkflowEvent,
        NewWorkflowTask,
        Notification,
        OrderId,
        TaskStatus,
        WorkflowEvent,
        WorkflowTask,
    },
    traits::{data_objects::TaskStatusCounts, OrderStoreError},
};

/// The durable side of the workflow engine: the task table that backs the queue, the append-only event log and the
/// notification inbox.
///
/// Task status updates are guarded. Each `mark_*` method only succeeds when the task is in the status the transition
/// starts from, and returns [`OrderStoreError::TaskStatusMismatch`] otherwise. Terminal tasks can therefore never be
/// picked up again.
#[allow(async_fn_in_trait)]
pub trait WorkflowStorage: Clone {
    /// Persists a new `Pending` task and returns it with its assigned id.
    async fn insert_task(&self, task: NewWorkflowTask) -> Result<WorkflowTask, OrderStoreError>;

    async fn fetch_task(&self, id: i64) -> Result<Option<WorkflowTask>, OrderStoreError>;

    /// All tasks with the given status, oldest first.
    async fn fetch_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<WorkflowTask>, OrderStoreError>;

    /// Every task ever scheduled for the order, oldest first.
    async fn fetch_tasks_for_order(&self, order_id: &OrderId) -> Result<Vec<WorkflowTask>, OrderStoreError>;

    /// `Pending` -> `Executing`. Sets `executed_at`.
    async fn mark_task_executing(&self, id: i64) -> Result<WorkflowTask, OrderStoreError>;

    /// `Executing` -> `Completed`. Sets `completed_at`.
    async fn mark_task_completed(&self, id: i64) -> Result<WorkflowTask, OrderStoreError>;

    /// `Executing` -> `Failed`. Sets `failed_at` and `last_error`. The retry count is left as it is.
    async fn mark_task_failed(&self, id: i64, error: &str) -> Result<WorkflowTask, OrderStoreError>;

    /// `Pending` -> `Cancelled`.
    async fn cancel_pending_task(&self, id: i64) -> Result<WorkflowTask, OrderStoreError>;

    /// `Executing` -> `Pending`, used when recovering tasks that were interrupted by a crash.
    async fn reset_task_to_pending(&self, id: i64) -> Result<WorkflowTask, OrderStoreError>;

    /// Counts tasks by status.
    async fn task_status_counts(&self) -> Result<TaskStatusCounts, OrderStoreError>;

    /// Appends an event to the workflow log.
    async fn insert_event(&self, event: NewWorkflowEvent) -> Result<WorkflowEvent, OrderStoreError>;

    /// The event log for an order, in the order the events were appended.
    async fn fetch_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WorkflowEvent>, OrderStoreError>;

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, OrderStoreError>;

    /// Notifications addressed to the given user, newest first.
    async fn fetch_notifications_for_user(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, OrderStoreError>;

    async fn mark_notification_read(&self, id: i64) -> Result<Notification, OrderStoreError>;
}
