//! The order status workflow engine.
//!
//! Status changes are never applied directly. [`WorkflowEngine::execute_status_transition`] validates the request and
//! stores a task. The dispatcher later calls [`WorkflowEngine::process_due_tasks`], which runs the due tasks: each one
//! re-checks its dependencies and conditions and then asks the order store to make the change in a single
//! transaction. Failed attempts are retried with a delay until the task runs out of retries.
//!
//! Every step leaves a trail in the workflow event log, and status changes and permanent failures produce
//! notifications.
use std::{
    collections::BTreeSet,
    fmt::{Debug, Display},
    sync::Arc,
};

use chrono::{Duration, Utc};
use futures_util::{stream, StreamExt};
use log::*;

use crate::{
    db_types::{
        Actor,
        ActorRole,
        EventType,
        NewNotification,
        NewOrder,
        NewWorkflowEvent,
        NewWorkflowTask,
        Notification,
        NotificationType,
        Order,
        OrderId,
        OrderStatus,
        Priority,
        Severity,
        TaskMetadata,
        TaskStatus,
        WorkflowAction,
        WorkflowCondition,
        WorkflowEvent,
        WorkflowTask,
    },
    events::{EventProducers, OrderChangedEvent, TaskFailedEvent},
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
    workflow::{
        auto_transitions::AutoTransitionRules,
        conditions::ConditionEvaluator,
        config::WorkflowConfig,
        errors::{TaskExecutionError, WorkflowError},
        task_queue::{group_by_order, TaskQueue},
        transitions::{is_valid_transition, next_allowed_statuses},
    },
};

//--------------------------------------   TransitionOptions   ---------------------------------------------------------
/// Optional settings for a requested status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    pub priority: Priority,
    /// Run the task this long from now, rather than as soon as possible.
    pub delay: Option<Duration>,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub conditions: Vec<WorkflowCondition>,
    /// Tasks that must have completed before this one may run
    pub dependencies: Vec<i64>,
    /// Overrides the configured retry limit for this task.
    pub max_retries: Option<u32>,
}

impl TransitionOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_condition(mut self, condition: WorkflowCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_dependency(mut self, task_id: i64) -> Self {
        self.dependencies.push(task_id);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

//--------------------------------------      Outcomes         ---------------------------------------------------------
/// What happened to a single task attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { task_id: i64, new_status: OrderStatus },
    /// The attempt failed and a new attempt was scheduled.
    Retried { task_id: i64, retry_task_id: i64, error: String },
    /// The attempt failed and no retries remain.
    Failed { task_id: i64, error: String },
    /// The task could not be started, usually because it was cancelled after the dispatch round began.
    Skipped { task_id: i64, reason: String },
}

impl TaskOutcome {
    pub fn task_id(&self) -> i64 {
        match self {
            TaskOutcome::Completed { task_id, .. }
            | TaskOutcome::Retried { task_id, .. }
            | TaskOutcome::Failed { task_id, .. }
            | TaskOutcome::Skipped { task_id, .. } => *task_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed { .. } => self.completed += 1,
            TaskOutcome::Retried { .. } => self.retried += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
            TaskOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.retried + self.failed + self.skipped
    }
}

impl Display for DispatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} completed, {} retried, {} failed, {} skipped",
            self.completed, self.retried, self.failed, self.skipped
        )
    }
}

/// The result of [`WorkflowEngine::recover_interrupted_tasks`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    /// Tasks whose status change had already been committed
    pub completed: Vec<i64>,
    /// Tasks that were put back in the queue
    pub requeued: Vec<i64>,
}

//--------------------------------------    WorkflowEngine     ---------------------------------------------------------
/// The order status workflow engine.
///
/// The engine is a plain value over a storage backend. Cloning it is cheap and every clone shares the same backend,
/// configuration and auto-transition rules.
#[derive(Clone)]
pub struct WorkflowEngine<B> {
    db: B,
    config: WorkflowConfig,
    evaluator: ConditionEvaluator,
    rules: Arc<AutoTransitionRules>,
    producers: EventProducers,
}

impl<B> Debug for WorkflowEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WorkflowEngine ({} auto-transition rules)", self.rules.len())
    }
}

impl<B> WorkflowEngine<B> {
    /// Creates an engine with the standard auto-transition rules.
    pub fn new(db: B, config: WorkflowConfig, producers: EventProducers) -> Self {
        let evaluator = ConditionEvaluator::new(config.unknown_field_policy);
        let rules = Arc::new(AutoTransitionRules::standard(config.auto_transition_delay));
        Self { db, config, evaluator, rules, producers }
    }

    /// Replaces the auto-transition rule table.
    pub fn with_auto_transition_rules(mut self, rules: AutoTransitionRules) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> WorkflowEngine<B>
where B: OrderManagement + WorkflowStorage
{
    //------------------------------------------   Orders   ------------------------------------------------------------

    /// Stores a new order with status `Submitted` and fires any auto-transition that applies to it.
    pub async fn submit_order(&self, order: NewOrder) -> Result<Order, WorkflowError> {
        let order = self.db.insert_order(order).await?;
        info!("⚙️ Order {} submitted by exchange {}", order.order_id, order.exchange_id);
        self.producers.publish_order_changed(OrderChangedEvent::created(order.clone())).await;
        self.apply_auto_transitions(&order).await;
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, WorkflowError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| WorkflowError::OrderNotFound(order_id.clone()))
    }

    /// Edits an order that is still `Submitted`. Adding proof of payment to an incoming order can make it eligible
    /// for an auto-transition, so the rules are consulted again.
    pub async fn modify_order(&self, order_id: &OrderId, update: ModifyOrderRequest) -> Result<Order, WorkflowError> {
        let OrderChanged { old_order, new_order } = self.db.modify_order(order_id, update).await?;
        info!("⚙️ Order {order_id} modified");
        self.producers.publish_order_changed(OrderChangedEvent::modified(old_order, new_order.clone())).await;
        self.apply_auto_transitions(&new_order).await;
        Ok(new_order)
    }

    pub async fn search_orders(
        &self,
        filter: OrderQueryFilter,
        sort: OrderSort,
        pagination: Pagination,
    ) -> Result<OrderPage, WorkflowError> {
        Ok(self.db.search_orders(filter, sort, pagination).await?)
    }

    /// The statuses the given role may move the order to from its current status.
    pub async fn allowed_transitions(
        &self,
        order_id: &OrderId,
        role: ActorRole,
    ) -> Result<BTreeSet<OrderStatus>, WorkflowError> {
        let order = self.fetch_order(order_id).await?;
        Ok(next_allowed_statuses(order.status, role))
    }

    pub async fn workflow_actions(&self, order_id: &OrderId) -> Result<Vec<WorkflowAction>, WorkflowError> {
        Ok(self.db.fetch_workflow_actions(order_id).await?)
    }

    //------------------------------------------ Scheduling ------------------------------------------------------------

    /// Requests that the order be moved to `target` on behalf of `actor`.
    ///
    /// The request is validated against the order's current status straight away. If it is allowed, a task is stored
    /// and returned; the order itself is only changed when the task runs. If the request is not allowed, the error is
    /// returned and nothing is stored.
    pub async fn execute_status_transition(
        &self,
        order_id: &OrderId,
        target: OrderStatus,
        actor: Actor,
        options: TransitionOptions,
    ) -> Result<WorkflowTask, WorkflowError> {
        let order = self.fetch_order(order_id).await?;
        if !is_valid_transition(order.status, target, actor.role) {
            debug!("⚙️ {actor} may not move order {order_id} from {} to {target}", order.status);
            return Err(WorkflowError::InvalidTransition { from: order.status, to: target, role: actor.role });
        }
        let tasks = self.db.fetch_tasks_for_order(order_id).await?;
        if let Some(active) = tasks.iter().find(|t| t.status.is_active()) {
            debug!("⚙️ Order {order_id} already has task #{} {}", active.id, active.status);
            return Err(WorkflowError::TaskAlreadyActive { order_id: order_id.clone(), task_id: active.id });
        }
        let metadata = TaskMetadata {
            notes: options.notes,
            reason: options.reason,
            previous_status: Some(order.status),
            retry_of: None,
        };
        let task = NewWorkflowTask {
            order_id: order_id.clone(),
            target_status: target,
            actor,
            priority: options.priority,
            scheduled_at: Utc::now() + options.delay.unwrap_or_else(Duration::zero),
            retry_count: 0,
            max_retries: options.max_retries.unwrap_or(self.config.max_retries),
            metadata,
            dependencies: options.dependencies,
            conditions: options.conditions,
        };
        self.schedule_task(task).await
    }

    /// Stores a task as-is and logs that it was scheduled. No validation is done here; callers that act on behalf of a
    /// user should go through [`Self::execute_status_transition`].
    ///
    /// The store refuses a second pending or executing task for the same order, so two concurrent requests for one
    /// order cannot both be queued. The loser gets [`WorkflowError::TaskAlreadyActive`].
    pub async fn schedule_task(&self, task: NewWorkflowTask) -> Result<WorkflowTask, WorkflowError> {
        let task = match self.db.insert_task(task).await {
            Ok(task) => task,
            Err(OrderStoreError::TaskAlreadyActive(order_id)) => return Err(self.active_task_conflict(order_id).await),
            Err(e) => return Err(e.into()),
        };
        debug!(
            "📋️ Task #{} scheduled: {} order {} to {} at {} ({} priority)",
            task.id, task.action, task.order_id, task.target_status, task.scheduled_at, task.priority
        );
        let event = NewWorkflowEvent::new(task.order_id.clone(), EventType::TaskScheduled, Severity::Info)
            .for_task(task.id)
            .with_detail("action", task.action.as_str())
            .with_detail("target_status", task.target_status.as_str())
            .with_detail("priority", task.priority.as_str())
            .with_detail("actor_id", task.actor.id.as_str())
            .with_detail("actor_role", task.actor.role.as_str())
            .with_detail("scheduled_at", task.scheduled_at.to_rfc3339());
        self.log_event(event).await;
        Ok(task)
    }

    /// Cancels a task that has not started yet.
    pub async fn cancel_task(&self, task_id: i64, reason: Option<String>) -> Result<WorkflowTask, WorkflowError> {
        let task = self.db.fetch_task(task_id).await?.ok_or(WorkflowError::TaskNotFound(task_id))?;
        if task.status != TaskStatus::Pending {
            return Err(WorkflowError::TaskStateConflict { id: task_id, status: task.status, action: "cancelled" });
        }
        let task = self.db.cancel_pending_task(task_id).await.map_err(|e| match e {
            OrderStoreError::TaskStatusMismatch { actual, .. } => {
                WorkflowError::TaskStateConflict { id: task_id, status: actual, action: "cancelled" }
            },
            e => WorkflowError::from(e),
        })?;
        info!("📋️ Task #{task_id} for order {} cancelled", task.order_id);
        let mut event =
            NewWorkflowEvent::new(task.order_id.clone(), EventType::TaskCancelled, Severity::Info).for_task(task_id);
        if let Some(reason) = reason {
            event = event.with_detail("reason", reason);
        }
        self.log_event(event).await;
        Ok(task)
    }

    //------------------------------------------  Dispatch  ------------------------------------------------------------

    /// Runs every task that is due.
    ///
    /// The due tasks are read from the store and ordered by priority, then scheduled time. Tasks for the same order run
    /// one after the other; up to `worker_shards` orders are worked on at once.
    ///
    /// Failures inside a task never escape this method. They are handled by the retry logic and show up in the
    /// summary.
    pub async fn process_due_tasks(&self) -> Result<DispatchSummary, WorkflowError> {
        let pending = self.db.fetch_tasks_by_status(TaskStatus::Pending).await?;
        let mut queue = TaskQueue::from_pending(pending);
        let due = queue.drain_due(Utc::now());
        if due.is_empty() {
            trace!("📋️ No tasks are due. {} waiting", queue.len());
            return Ok(DispatchSummary::default());
        }
        debug!("📋️ {} tasks are due. {} waiting", due.len(), queue.len());
        let shards = self.config.worker_shards.max(1);
        let outcomes = stream::iter(group_by_order(due))
            .map(|(order_id, tasks)| async move {
                trace!("📋️ Running {} task(s) for order {order_id}", tasks.len());
                let mut outcomes = Vec::with_capacity(tasks.len());
                for task in tasks {
                    outcomes.push(self.run_task(task).await);
                }
                outcomes
            })
            .buffer_unordered(shards)
            .collect::<Vec<_>>()
            .await;
        let mut summary = DispatchSummary::default();
        outcomes.iter().flatten().for_each(|o| summary.record(o));
        debug!("📋️ Dispatch round finished: {summary}");
        Ok(summary)
    }

    /// Runs a single pending task now, regardless of its scheduled time.
    pub async fn execute_task(&self, task_id: i64) -> Result<TaskOutcome, WorkflowError> {
        let task = self.db.fetch_task(task_id).await?.ok_or(WorkflowError::TaskNotFound(task_id))?;
        if task.status != TaskStatus::Pending {
            return Err(WorkflowError::TaskStateConflict { id: task_id, status: task.status, action: "executed" });
        }
        Ok(self.run_task(task).await)
    }

    /// Deals with tasks left `Executing` by a crash.
    ///
    /// If the order already holds the task's target status, the change was committed before the crash and the task
    /// is marked completed. Otherwise the task goes back to `Pending` and runs again.
    pub async fn recover_interrupted_tasks(&self) -> Result<RecoverySummary, WorkflowError> {
        let interrupted = self.db.fetch_tasks_by_status(TaskStatus::Executing).await?;
        let mut summary = RecoverySummary::default();
        for task in interrupted {
            let order = self.db.fetch_order(&task.order_id).await?;
            match order {
                Some(order) if order.status == task.target_status => {
                    self.db.mark_task_completed(task.id).await?;
                    let event = NewWorkflowEvent::new(task.order_id.clone(), EventType::TaskCompleted, Severity::Info)
                        .for_task(task.id)
                        .with_detail("target_status", task.target_status.as_str())
                        .with_detail("recovered", true);
                    self.log_event(event).await;
                    info!(
                        "⚙️ Task #{} had already moved order {} to {}. Marked completed.",
                        task.id, order.order_id, order.status
                    );
                    summary.completed.push(task.id);
                    self.apply_auto_transitions(&order).await;
                },
                _ => {
                    self.db.reset_task_to_pending(task.id).await?;
                    info!("⚙️ Task #{} for order {} was interrupted. Returned to the queue.", task.id, task.order_id);
                    summary.requeued.push(task.id);
                },
            }
        }
        Ok(summary)
    }

    async fn run_task(&self, task: WorkflowTask) -> TaskOutcome {
        let task = match self.db.mark_task_executing(task.id).await {
            Ok(task) => task,
            Err(e) => {
                warn!("📋️ Task #{} could not be started: {e}", task.id);
                return TaskOutcome::Skipped { task_id: task.id, reason: e.to_string() };
            },
        };
        trace!("📋️ Task #{} started (attempt {} of {})", task.id, task.retry_count + 1, task.max_retries + 1);
        let event = NewWorkflowEvent::new(task.order_id.clone(), EventType::TaskStarted, Severity::Info)
            .for_task(task.id)
            .with_detail("attempt", task.retry_count + 1);
        self.log_event(event).await;
        // The deadline covers the checks only. Once the status transaction is under way it may commit even if its
        // future is dropped, so it always runs to completion.
        let result = match tokio::time::timeout(self.config.task_timeout_std(), self.check_preconditions(&task)).await {
            Ok(Ok(())) => self.apply_status_change(&task).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TaskExecutionError::TimedOut(self.config.task_timeout)),
        };
        match result {
            Ok(changed) => self.on_task_success(task, changed).await,
            Err(e) => self.on_task_failure(task, e).await,
        }
    }

    /// Every dependency must have completed and every condition must hold against the order as it is now.
    async fn check_preconditions(&self, task: &WorkflowTask) -> Result<(), TaskExecutionError> {
        for dep_id in &task.dependencies {
            match self.db.fetch_task(*dep_id).await? {
                None => return Err(TaskExecutionError::DependencyMissing(*dep_id)),
                Some(dep) if dep.status != TaskStatus::Completed => {
                    return Err(TaskExecutionError::DependencyNotMet { id: dep.id, status: dep.status });
                },
                Some(_) => {},
            }
        }
        let order = self
            .db
            .fetch_order(&task.order_id)
            .await?
            .ok_or_else(|| OrderStoreError::OrderNotFound(task.order_id.clone()))?;
        let outcome = self.evaluator.evaluate_all(&order, &task.conditions);
        if !outcome.passed {
            return Err(TaskExecutionError::ConditionFailed(outcome.failed_condition.unwrap_or_default()));
        }
        Ok(())
    }

    async fn apply_status_change(&self, task: &WorkflowTask) -> Result<OrderChanged, TaskExecutionError> {
        let update = StatusUpdate::new(task.order_id.clone(), task.target_status, task.actor.clone())
            .with_notes(task.metadata.notes.clone())
            .with_reason(task.metadata.reason.clone());
        let changed = self.db.update_order_status(update).await?;
        Ok(changed)
    }

    async fn on_task_success(&self, task: WorkflowTask, changed: OrderChanged) -> TaskOutcome {
        let OrderChanged { old_order, new_order } = changed;
        info!(
            "⚙️ Order {} moved from {} to {} by {}",
            new_order.order_id, old_order.status, new_order.status, task.actor
        );
        self.notify_owner(&task, &old_order, &new_order).await;
        if let Err(e) = self.db.mark_task_completed(task.id).await {
            error!("⚙️ Task #{} changed order {} but could not be marked completed. {e}", task.id, task.order_id);
        }
        let completed = NewWorkflowEvent::new(task.order_id.clone(), EventType::TaskCompleted, Severity::Info)
            .for_task(task.id)
            .with_detail("target_status", task.target_status.as_str())
            .with_detail("attempt", task.retry_count + 1);
        self.log_event(completed).await;
        let status_changed = NewWorkflowEvent::new(task.order_id.clone(), EventType::StatusChanged, Severity::Info)
            .for_task(task.id)
            .with_detail("from_status", old_order.status.as_str())
            .with_detail("to_status", new_order.status.as_str())
            .with_detail("actor_id", task.actor.id.as_str())
            .with_detail("actor_role", task.actor.role.as_str());
        self.log_event(status_changed).await;
        self.producers.publish_order_changed(OrderChangedEvent::modified(old_order, new_order.clone())).await;
        if new_order.status.is_terminal() {
            let finished = NewWorkflowEvent::new(task.order_id.clone(), EventType::WorkflowCompleted, Severity::Info)
                .for_task(task.id)
                .with_detail("final_status", new_order.status.as_str());
            self.log_event(finished).await;
        }
        self.apply_auto_transitions(&new_order).await;
        TaskOutcome::Completed { task_id: task.id, new_status: new_order.status }
    }

    async fn on_task_failure(&self, task: WorkflowTask, error: TaskExecutionError) -> TaskOutcome {
        let message = error.to_string();
        let task = match self.db.mark_task_failed(task.id, &message).await {
            Ok(failed) => failed,
            Err(e) => {
                error!("📋️ Could not record the failure of task #{}. {e}", task.id);
                task
            },
        };
        if !task.can_retry() {
            return self.fail_permanently(task, message).await;
        }
        let delay = self.config.retry_policy().delay_for(task.retry_count);
        let retry = task.retry_copy(Utc::now() + delay);
        match self.db.insert_task(retry).await {
            Ok(next) => {
                warn!(
                    "📋️ Task #{} for order {} failed: {message}. Retry {} of {} scheduled as task #{} at {}",
                    task.id, task.order_id, next.retry_count, next.max_retries, next.id, next.scheduled_at
                );
                let event = NewWorkflowEvent::new(task.order_id.clone(), EventType::TaskRetried, Severity::Warning)
                    .for_task(task.id)
                    .with_detail("error", message.as_str())
                    .with_detail("retry_task_id", next.id)
                    .with_detail("retry_count", next.retry_count)
                    .with_detail("max_retries", next.max_retries)
                    .with_detail("scheduled_at", next.scheduled_at.to_rfc3339());
                self.log_event(event).await;
                TaskOutcome::Retried { task_id: task.id, retry_task_id: next.id, error: message }
            },
            Err(e) => {
                error!("📋️ Could not schedule a retry for task #{}. {e}", task.id);
                self.fail_permanently(task, message).await
            },
        }
    }

    async fn fail_permanently(&self, task: WorkflowTask, message: String) -> TaskOutcome {
        error!(
            "⚙️ Task #{} ({} order {} to {}) failed permanently after {} retries: {message}",
            task.id, task.action, task.order_id, task.target_status, task.retry_count
        );
        let failed = NewWorkflowEvent::new(task.order_id.clone(), EventType::TaskFailed, Severity::Error)
            .for_task(task.id)
            .with_detail("error", message.as_str())
            .with_detail("retry_count", task.retry_count)
            .with_detail("max_retries", task.max_retries)
            .with_detail("target_status", task.target_status.as_str());
        self.log_event(failed).await;
        let workflow_failed = NewWorkflowEvent::new(task.order_id.clone(), EventType::WorkflowFailed, Severity::Error)
            .for_task(task.id)
            .with_detail("error", message.as_str())
            .with_detail("target_status", task.target_status.as_str());
        self.log_event(workflow_failed).await;
        let title = format!("Workflow failed for order {}", task.order_id);
        let body = format!(
            "Moving order {} to {} failed after {} retries. Last error: {message}",
            task.order_id, task.target_status, task.retry_count
        );
        let notification = NewNotification::new(
            self.config.admin_channel.as_str(),
            task.order_id.clone(),
            NotificationType::WorkflowFailure,
            title,
            body,
        )
        .with_priority(Priority::High);
        self.send_notification(notification, task.id).await;
        let task_id = task.id;
        self.producers.publish_task_failed(TaskFailedEvent::new(task, message.clone())).await;
        TaskOutcome::Failed { task_id, error: message }
    }

    async fn active_task_conflict(&self, order_id: OrderId) -> WorkflowError {
        let active = match self.db.fetch_tasks_for_order(&order_id).await {
            Ok(tasks) => tasks.into_iter().find(|t| t.status.is_active()),
            Err(e) => {
                warn!("📋️ Could not look up the active task for order {order_id}. {e}");
                None
            },
        };
        match active {
            Some(task) => {
                debug!("⚙️ Order {order_id} already has task #{} {}", task.id, task.status);
                WorkflowError::TaskAlreadyActive { order_id, task_id: task.id }
            },
            None => WorkflowError::StorageError(OrderStoreError::TaskAlreadyActive(order_id)),
        }
    }

    /// Consults the auto-transition rules for the order's current status and schedules the first match.
    async fn apply_auto_transitions(&self, order: &Order) -> Option<WorkflowTask> {
        let rule = self.rules.first_match(order).await?;
        let mut options = TransitionOptions::default().with_notes(format!("Automatic transition ({})", rule.name));
        if let Some(delay) = rule.delay {
            options = options.with_delay(delay);
        }
        match self.execute_status_transition(&order.order_id, rule.target, Actor::system(), options).await {
            Ok(task) => {
                info!(
                    "⚙️ Auto-transition {} scheduled for order {}: {} -> {} (task #{})",
                    rule.name, order.order_id, order.status, rule.target, task.id
                );
                Some(task)
            },
            Err(e) => {
                warn!("⚙️ Auto-transition {} for order {} was not scheduled. {e}", rule.name, order.order_id);
                None
            },
        }
    }

    //------------------------------------------ Event trail ------------------------------------------------------------

    async fn notify_owner(&self, task: &WorkflowTask, old_order: &Order, new_order: &Order) {
        let notification_type =
            if task.actor.is_system() { NotificationType::AutoTransition } else { NotificationType::StatusUpdate };
        let title = format!("Order {} is now {}", new_order.order_id, new_order.status);
        let body = match &task.metadata.reason {
            Some(reason) => format!(
                "Your order {} moved from {} to {}. Reason: {reason}",
                new_order.order_id, old_order.status, new_order.status
            ),
            None => format!("Your order {} moved from {} to {}.", new_order.order_id, old_order.status, new_order.status),
        };
        let notification =
            NewNotification::new(new_order.owner_id.as_str(), new_order.order_id.clone(), notification_type, title, body)
                .with_priority(task.priority);
        self.send_notification(notification, task.id).await;
    }

    async fn send_notification(&self, notification: NewNotification, task_id: i64) {
        match self.db.insert_notification(notification).await {
            Ok(n) => {
                trace!("⚙️ Notification #{} sent to {} for order {}", n.id, n.recipient_id, n.order_id);
                let event = NewWorkflowEvent::new(n.order_id.clone(), EventType::NotificationSent, Severity::Info)
                    .for_task(task_id)
                    .with_detail("notification_id", n.id)
                    .with_detail("recipient_id", n.recipient_id.as_str())
                    .with_detail("notification_type", n.notification_type.as_str());
                self.log_event(event).await;
            },
            Err(e) => error!("⚙️ Could not store a notification for task #{task_id}. {e}"),
        }
    }

    /// Appends to the event log. A failure to write the log is reported but does not stop the workflow.
    async fn log_event(&self, event: NewWorkflowEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.db.insert_event(event).await {
            error!("⚙️ Could not write {event_type} event to the workflow log. {e}");
        }
    }

    //------------------------------------------   Queries   -----------------------------------------------------------

    pub async fn fetch_task(&self, task_id: i64) -> Result<Option<WorkflowTask>, WorkflowError> {
        Ok(self.db.fetch_task(task_id).await?)
    }

    pub async fn order_tasks(&self, order_id: &OrderId) -> Result<Vec<WorkflowTask>, WorkflowError> {
        Ok(self.db.fetch_tasks_for_order(order_id).await?)
    }

    pub async fn order_events(&self, order_id: &OrderId) -> Result<Vec<WorkflowEvent>, WorkflowError> {
        Ok(self.db.fetch_events_for_order(order_id).await?)
    }

    pub async fn notifications_for(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, WorkflowError> {
        Ok(self.db.fetch_notifications_for_user(recipient_id, unread_only).await?)
    }

    pub async fn mark_notification_read(&self, id: i64) -> Result<Notification, WorkflowError> {
        Ok(self.db.mark_notification_read(id).await?)
    }

    /// Task counts by status, across all orders.
    pub async fn workflow_stats(&self) -> Result<TaskStatusCounts, WorkflowError> {
        Ok(self.db.task_status_counts().await?)
    }
}
