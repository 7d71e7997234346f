//! `SqliteDatabase` is a concrete implementation of an order workflow backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{db_url, events, new_pool, notifications, orders, tasks, tasks::TaskUpdate, workflow_actions};
use crate::{
    db_types::{
        NewNotification,
        NewOrder,
        NewWorkflowEvent,
        NewWorkflowTask,
        Notification,
        Order,
        OrderId,
        OrderStatus,
        TaskStatus,
        WorkflowAction,
        WorkflowEvent,
        WorkflowTask,
    },
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
    workflow::is_valid_transition,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    /// Takes a new order, and in a single atomic transaction,
    /// * allocates the next order id for the month the order was created in,
    /// * stores the order with status `Submitted`.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_id, order.id);
        Ok(order)
    }

    async fn update_order_status(&self, update: StatusUpdate) -> Result<OrderChanged, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let old_order = orders::fetch_order_by_order_id(&update.order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderStoreError::OrderNotFound(update.order_id.clone()))?;
        if !is_valid_transition(old_order.status, update.new_status, update.actor.role) {
            debug!(
                "🗃️ Rejecting status change for {}: {} -> {} is not allowed for {}",
                update.order_id, old_order.status, update.new_status, update.actor
            );
            return Err(OrderStoreError::InvalidTransition {
                from: old_order.status,
                to: update.new_status,
                role: update.actor.role,
            });
        }
        let now = Utc::now();
        let mut timestamps = old_order.timestamps.clone();
        timestamps.record_status(update.new_status, now);
        let new_order = orders::update_order_status(&update, old_order.status, &timestamps, now, &mut tx)
            .await?
            .ok_or_else(|| OrderStoreError::ConcurrentModification(update.order_id.clone()))?;
        workflow_actions::insert_action(old_order.status, &update, now, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Order {} status changed from {} to {} by {}",
            update.order_id, old_order.status, new_order.status, update.actor
        );
        Ok(OrderChanged::new(old_order, new_order))
    }

    async fn modify_order(
        &self,
        order_id: &OrderId,
        update: ModifyOrderRequest,
    ) -> Result<OrderChanged, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let old_order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| OrderStoreError::OrderNotFound(order_id.clone()))?;
        if old_order.status != OrderStatus::Submitted {
            return Err(OrderStoreError::OrderNotEditable(order_id.clone(), old_order.status));
        }
        let new_order = orders::update_order(&old_order, update, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} has been modified");
        Ok(OrderChanged::new(old_order, new_order))
    }

    async fn search_orders(
        &self,
        filter: OrderQueryFilter,
        sort: OrderSort,
        pagination: Pagination,
    ) -> Result<OrderPage, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let (orders, total) = orders::search_orders(&filter, sort, pagination, &mut conn).await?;
        Ok(OrderPage { orders, total, page: pagination.page, page_size: pagination.page_size })
    }

    async fn fetch_workflow_actions(&self, order_id: &OrderId) -> Result<Vec<WorkflowAction>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let actions = workflow_actions::fetch_actions_for_order(order_id, &mut conn).await?;
        Ok(actions)
    }

    async fn close(&mut self) -> Result<(), OrderStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl WorkflowStorage for SqliteDatabase {
    async fn insert_task(&self, task: NewWorkflowTask) -> Result<WorkflowTask, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order_id = task.order_id.clone();
        let task = tasks::insert_task(task, Utc::now(), &mut conn).await.map_err(|e| match e {
            sqlx::Error::Database(de) if de.is_unique_violation() => {
                debug!("🗃️ Order {order_id} already has an active task. The new task was not stored.");
                OrderStoreError::TaskAlreadyActive(order_id)
            },
            e => OrderStoreError::from(e),
        })?;
        trace!("🗃️ Task #{} ({}) stored for order {}", task.id, task.action, task.order_id);
        Ok(task)
    }

    async fn fetch_task(&self, id: i64) -> Result<Option<WorkflowTask>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let task = tasks::fetch_task(id, &mut conn).await?;
        Ok(task)
    }

    async fn fetch_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<WorkflowTask>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let tasks = tasks::fetch_tasks_by_status(status, &mut conn).await?;
        Ok(tasks)
    }

    async fn fetch_tasks_for_order(&self, order_id: &OrderId) -> Result<Vec<WorkflowTask>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let tasks = tasks::fetch_tasks_for_order(order_id, &mut conn).await?;
        Ok(tasks)
    }

    async fn mark_task_executing(&self, id: i64) -> Result<WorkflowTask, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        tasks::update_task_status(id, TaskUpdate::Executing(Utc::now()), &mut conn).await
    }

    async fn mark_task_completed(&self, id: i64) -> Result<WorkflowTask, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        tasks::update_task_status(id, TaskUpdate::Completed(Utc::now()), &mut conn).await
    }

    async fn mark_task_failed(&self, id: i64, error: &str) -> Result<WorkflowTask, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        tasks::update_task_status(id, TaskUpdate::Failed(Utc::now(), error), &mut conn).await
    }

    async fn cancel_pending_task(&self, id: i64) -> Result<WorkflowTask, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        tasks::update_task_status(id, TaskUpdate::Cancelled, &mut conn).await
    }

    async fn reset_task_to_pending(&self, id: i64) -> Result<WorkflowTask, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        tasks::update_task_status(id, TaskUpdate::Requeued, &mut conn).await
    }

    async fn task_status_counts(&self) -> Result<TaskStatusCounts, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        tasks::task_status_counts(&mut conn).await
    }

    async fn insert_event(&self, event: NewWorkflowEvent) -> Result<WorkflowEvent, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let event = events::insert_event(event, &mut conn).await?;
        Ok(event)
    }

    async fn fetch_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WorkflowEvent>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let events = events::fetch_events_for_order(order_id, &mut conn).await?;
        Ok(events)
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let notification = notifications::insert_notification(notification, Utc::now(), &mut conn).await?;
        Ok(notification)
    }

    async fn fetch_notifications_for_user(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let notifications = notifications::fetch_notifications_for_user(recipient_id, unread_only, &mut conn).await?;
        Ok(notifications)
    }

    async fn mark_notification_read(&self, id: i64) -> Result<Notification, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        notifications::mark_notification_read(id, &mut conn).await?.ok_or(OrderStoreError::NotificationNotFound(id))
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}
