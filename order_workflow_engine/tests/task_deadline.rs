use std::time::Duration as StdDuration;

use chrono::Duration;
use order_workflow_engine::{
    db_types::*,
    events::EventProducers,
    test_utils::prepare_env::{new_test_database, tear_down},
    traits::{
        ModifyOrderRequest,
        OrderChanged,
        OrderManagement,
        OrderPage,
        OrderQueryFilter,
        OrderSort,
        OrderStoreError,
        Pagination,
        StatusUpdate,
        TaskStatusCounts,
        WorkflowStorage,
    },
    workflow::TaskOutcome,
    SqliteDatabase,
    TransitionOptions,
    WorkflowConfig,
    WorkflowEngine,
};

/// A store whose status changes commit straight away but only report back after `delay`, the way a slow commit on a
/// busy database would.
#[derive(Clone)]
struct SlowStatusUpdates {
    inner: SqliteDatabase,
    delay: StdDuration,
}

impl OrderManagement for SlowStatusUpdates {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError> {
        self.inner.fetch_order(order_id).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
        self.inner.insert_order(order).await
    }

    async fn update_order_status(&self, update: StatusUpdate) -> Result<OrderChanged, OrderStoreError> {
        let changed = self.inner.update_order_status(update).await?;
        tokio::time::sleep(self.delay).await;
        Ok(changed)
    }

    async fn modify_order(&self, order_id: &OrderId, update: ModifyOrderRequest) -> Result<OrderChanged, OrderStoreError> {
        self.inner.modify_order(order_id, update).await
    }

    async fn search_orders(
        &self,
        filter: OrderQueryFilter,
        sort: OrderSort,
        pagination: Pagination,
    ) -> Result<OrderPage, OrderStoreError> {
        self.inner.search_orders(filter, sort, pagination).await
    }

    async fn fetch_workflow_actions(&self, order_id: &OrderId) -> Result<Vec<WorkflowAction>, OrderStoreError> {
        self.inner.fetch_workflow_actions(order_id).await
    }
}

impl WorkflowStorage for SlowStatusUpdates {
    async fn insert_task(&self, task: NewWorkflowTask) -> Result<WorkflowTask, OrderStoreError> {
        self.inner.insert_task(task).await
    }

    async fn fetch_task(&self, id: i64) -> Result<Option<WorkflowTask>, OrderStoreError> {
        self.inner.fetch_task(id).await
    }

    async fn fetch_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<WorkflowTask>, OrderStoreError> {
        self.inner.fetch_tasks_by_status(status).await
    }

    async fn fetch_tasks_for_order(&self, order_id: &OrderId) -> Result<Vec<WorkflowTask>, OrderStoreError> {
        self.inner.fetch_tasks_for_order(order_id).await
    }

    async fn mark_task_executing(&self, id: i64) -> Result<WorkflowTask, OrderStoreError> {
        self.inner.mark_task_executing(id).await
    }

    async fn mark_task_completed(&self, id: i64) -> Result<WorkflowTask, OrderStoreError> {
        self.inner.mark_task_completed(id).await
    }

    async fn mark_task_failed(&self, id: i64, error: &str) -> Result<WorkflowTask, OrderStoreError> {
        self.inner.mark_task_failed(id, error).await
    }

    async fn cancel_pending_task(&self, id: i64) -> Result<WorkflowTask, OrderStoreError> {
        self.inner.cancel_pending_task(id).await
    }

    async fn reset_task_to_pending(&self, id: i64) -> Result<WorkflowTask, OrderStoreError> {
        self.inner.reset_task_to_pending(id).await
    }

    async fn task_status_counts(&self) -> Result<TaskStatusCounts, OrderStoreError> {
        self.inner.task_status_counts().await
    }

    async fn insert_event(&self, event: NewWorkflowEvent) -> Result<WorkflowEvent, OrderStoreError> {
        self.inner.insert_event(event).await
    }

    async fn fetch_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WorkflowEvent>, OrderStoreError> {
        self.inner.fetch_events_for_order(order_id).await
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, OrderStoreError> {
        self.inner.insert_notification(notification).await
    }

    async fn fetch_notifications_for_user(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, OrderStoreError> {
        self.inner.fetch_notifications_for_user(recipient_id, unread_only).await
    }

    async fn mark_notification_read(&self, id: i64) -> Result<Notification, OrderStoreError> {
        self.inner.mark_notification_read(id).await
    }
}

#[tokio::test]
async fn slow_status_change_is_not_reported_as_a_timeout() {
    let db = new_test_database().await;
    let store = SlowStatusUpdates { inner: db.clone(), delay: StdDuration::from_millis(300) };
    let config = WorkflowConfig::default()
        .with_retry_delay(Duration::zero())
        .with_auto_transition_delay(Duration::zero())
        .with_task_timeout(Duration::milliseconds(100));
    let engine = WorkflowEngine::new(store, config, EventProducers::default());
    let order = engine
        .submit_order(NewOrder::new("exchange-1", "owner-1", OrderType::Outgoing, Amount::from_major(100)))
        .await
        .unwrap();
    let task = engine
        .execute_status_transition(&order.order_id, OrderStatus::Processing, Actor::admin("admin-1"), TransitionOptions::default())
        .await
        .unwrap();

    let outcome = engine.execute_task(task.id).await.unwrap();
    assert_eq!(outcome, TaskOutcome::Completed { task_id: task.id, new_status: OrderStatus::Processing });
    assert_eq!(engine.fetch_order(&order.order_id).await.unwrap().status, OrderStatus::Processing);

    let tasks = engine.order_tasks(&order.order_id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    let events = engine.order_events(&order.order_id).await.unwrap();
    assert_eq!(events.iter().filter(|e| e.event_type == EventType::StatusChanged).count(), 1);
    assert!(events.iter().all(|e| e.event_type != EventType::TaskRetried));
    assert!(engine.notifications_for("admin", false).await.unwrap().is_empty());
    assert_eq!(engine.notifications_for("owner-1", false).await.unwrap().len(), 1);
    tear_down(db).await;
}
