use std::{
    collections::BTreeMap,
    fmt::Display,
    str::FromStr,
};

use chrono::{DateTime, Utc};
pub use owf_common::Amount;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum, using the given string for each variant.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("Invalid {}: {s}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------        OrderId        ---------------------------------------------------------
/// The public order identifier, `T<YY><MM><seq>`. See [`crate::helpers::order_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      OrderStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The order has been submitted by an exchange. Every order starts here, and never returns.
    Submitted,
    /// Kept for older orders, and reached automatically by incoming orders that carry proof of payment.
    PendingReview,
    /// Kept for older orders.
    Approved,
    /// Rejected by an administrator. An administrator may reopen the order into `Processing`.
    Rejected,
    Processing,
    Completed,
    Cancelled,
    /// The exchange has asked for the order to be cancelled. An administrator must approve or deny the request.
    CancellationRequested,
}

string_enum!(OrderStatus {
    Submitted => "submitted",
    PendingReview => "pending_review",
    Approved => "approved",
    Rejected => "rejected",
    Processing => "processing",
    Completed => "completed",
    Cancelled => "cancelled",
    CancellationRequested => "cancellation_requested",
});

impl OrderStatus {
    /// `Completed` and `Cancelled` have no outbound transitions for any role.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

//--------------------------------------       OrderType       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Funds arriving at the exchange
    Incoming,
    /// Funds leaving the exchange
    Outgoing,
}

string_enum!(OrderType { Incoming => "incoming", Outgoing => "outgoing" });

//--------------------------------------        Priority       ---------------------------------------------------------
/// Priority of orders, tasks and notifications. The derived ordering runs from `Low` to `Critical`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

string_enum!(Priority { Low => "low", Normal => "normal", High => "high", Critical => "critical" });

//--------------------------------------     Actor & Role      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Brokerage staff. Reviews and progresses orders.
    Admin,
    /// An exchange office. Submits orders and may request cancellation.
    Exchange,
    /// The workflow engine itself, acting with administrator privileges when firing auto-transitions.
    System,
}

string_enum!(ActorRole { Admin => "admin", Exchange => "exchange", System => "system" });

pub const SYSTEM_ACTOR_ID: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new<S: Into<String>>(id: S, role: ActorRole) -> Self {
        Self { id: id.into(), role }
    }

    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    pub fn exchange<S: Into<String>>(id: S) -> Self {
        Self::new(id, ActorRole::Exchange)
    }

    /// The distinguished principal recorded against auto-transitions.
    pub fn system() -> Self {
        Self::new(SYSTEM_ACTOR_ID, ActorRole::System)
    }

    pub fn is_system(&self) -> bool {
        self.role == ActorRole::System
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

//--------------------------------------      Milestones       ---------------------------------------------------------
pub const MILESTONE_CREATED: &str = "created";
pub const MILESTONE_UPDATED: &str = "updated";

/// Timestamps keyed by lifecycle milestone: `created`, `updated`, and one entry per status the order has reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Milestones(BTreeMap<String, DateTime<Utc>>);

impl Milestones {
    pub fn new(created: DateTime<Utc>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(MILESTONE_CREATED.to_string(), created);
        map.insert(MILESTONE_UPDATED.to_string(), created);
        map.insert(OrderStatus::Submitted.to_string(), created);
        Self(map)
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.get(MILESTONE_CREATED)
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.get(MILESTONE_UPDATED)
    }

    pub fn get(&self, milestone: &str) -> Option<DateTime<Utc>> {
        self.0.get(milestone).copied()
    }

    pub fn for_status(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        self.get(status.as_str())
    }

    /// Records that the order reached `status` at the given time. `updated` moves with it. The `created` milestone
    /// is never touched.
    pub fn record_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.0.insert(status.to_string(), at);
        self.touch(at);
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.0.insert(MILESTONE_UPDATED.to_string(), at);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub exchange_id: String,
    /// The user id of the exchange account that submitted the order. Status notifications are addressed here.
    pub owner_id: String,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub submitted_amount: Amount,
    pub commission: Amount,
    pub priority: Priority,
    pub notes: Option<String>,
    pub reason: Option<String>,
    /// References to the proof-of-payment files attached to the order
    pub screenshots: Vec<String>,
    pub timestamps: Milestones,
}

impl Order {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamps.created()
    }

    /// Whole and fractional hours elapsed since the order was created.
    pub fn hours_since_created(&self, now: DateTime<Utc>) -> Option<f64> {
        self.created_at().map(|c| (now - c).num_seconds() as f64 / 3600.0)
    }

    pub fn has_screenshots(&self) -> bool {
        !self.screenshots.is_empty()
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub exchange_id: String,
    pub owner_id: String,
    pub order_type: OrderType,
    pub submitted_amount: Amount,
    /// Commission rate in basis points. The commission is computed from this when the order is stored.
    pub commission_rate_bps: i64,
    pub priority: Priority,
    pub notes: Option<String>,
    pub screenshots: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(exchange_id: S, owner_id: S, order_type: OrderType, amount: Amount) -> Self {
        Self {
            exchange_id: exchange_id.into(),
            owner_id: owner_id.into(),
            order_type,
            submitted_amount: amount,
            commission_rate_bps: 0,
            priority: Priority::Normal,
            notes: None,
            screenshots: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_commission_rate(mut self, bps: i64) -> Self {
        self.commission_rate_bps = bps;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_screenshot<S: Into<String>>(mut self, file_ref: S) -> Self {
        self.screenshots.push(file_ref.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn commission(&self) -> Amount {
        self.submitted_amount.apply_rate_bps(self.commission_rate_bps)
    }
}

//--------------------------------------    Workflow actions   ---------------------------------------------------------
/// The audit record appended by the order store each time it commits a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowAction {
    pub id: i64,
    pub order_id: OrderId,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       TaskStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

string_enum!(TaskStatus {
    Pending => "pending",
    Executing => "executing",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Executing)
    }
}

//--------------------------------------       TaskAction      ---------------------------------------------------------
/// What a task does, derived from the status it moves the order to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Submit,
    Review,
    Approve,
    Reject,
    StartProcessing,
    Complete,
    Cancel,
    RequestCancellation,
}

string_enum!(TaskAction {
    Submit => "submit",
    Review => "review",
    Approve => "approve",
    Reject => "reject",
    StartProcessing => "start_processing",
    Complete => "complete",
    Cancel => "cancel",
    RequestCancellation => "request_cancellation",
});

impl From<OrderStatus> for TaskAction {
    fn from(target: OrderStatus) -> Self {
        match target {
            OrderStatus::Submitted => TaskAction::Submit,
            OrderStatus::PendingReview => TaskAction::Review,
            OrderStatus::Approved => TaskAction::Approve,
            OrderStatus::Rejected => TaskAction::Reject,
            OrderStatus::Processing => TaskAction::StartProcessing,
            OrderStatus::Completed => TaskAction::Complete,
            OrderStatus::Cancelled => TaskAction::Cancel,
            OrderStatus::CancellationRequested => TaskAction::RequestCancellation,
        }
    }
}

//--------------------------------------   WorkflowCondition   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    TimeBased,
    AmountBased,
    UserBased,
    Custom,
}

string_enum!(ConditionType {
    TimeBased => "time_based",
    AmountBased => "amount_based",
    UserBased => "user_based",
    Custom => "custom",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    GreaterThan,
    LessThan,
    Contains,
}

string_enum!(ConditionOperator {
    Equals => "equals",
    GreaterThan => "greater_than",
    LessThan => "less_than",
    Contains => "contains",
});

/// A declarative guard attached to a task. Evaluated against the order just before the task mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCondition {
    pub condition_type: ConditionType,
    pub operator: ConditionOperator,
    pub field: String,
    pub value: Value,
    pub description: String,
}

impl WorkflowCondition {
    pub fn new<F, D, V>(condition_type: ConditionType, field: F, operator: ConditionOperator, value: V, description: D) -> Self
    where
        F: Into<String>,
        D: Into<String>,
        V: Into<Value>,
    {
        Self { condition_type, operator, field: field.into(), value: value.into(), description: description.into() }
    }
}

//--------------------------------------     WorkflowTask      ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<OrderStatus>,
    /// The id of the failed attempt that this task retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: i64,
    pub order_id: OrderId,
    pub action: TaskAction,
    pub target_status: OrderStatus,
    pub actor: Actor,
    pub priority: Priority,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: TaskStatus,
    pub last_error: Option<String>,
    pub metadata: TaskMetadata,
    pub dependencies: Vec<i64>,
    pub conditions: Vec<WorkflowCondition>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowTask {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// A fresh pending copy of this task for the next attempt. The copy keeps the order, target, actor, conditions and
    /// dependencies, and records which attempt it retries.
    pub fn retry_copy(&self, scheduled_at: DateTime<Utc>) -> NewWorkflowTask {
        let mut metadata = self.metadata.clone();
        metadata.retry_of = Some(self.id);
        NewWorkflowTask {
            order_id: self.order_id.clone(),
            target_status: self.target_status,
            actor: self.actor.clone(),
            priority: self.priority,
            scheduled_at,
            retry_count: self.retry_count + 1,
            max_retries: self.max_retries,
            metadata,
            dependencies: self.dependencies.clone(),
            conditions: self.conditions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkflowTask {
    pub order_id: OrderId,
    pub target_status: OrderStatus,
    pub actor: Actor,
    pub priority: Priority,
    pub scheduled_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub metadata: TaskMetadata,
    pub dependencies: Vec<i64>,
    pub conditions: Vec<WorkflowCondition>,
}

impl NewWorkflowTask {
    pub fn action(&self) -> TaskAction {
        TaskAction::from(self.target_status)
    }
}

//--------------------------------------     WorkflowEvent     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskScheduled,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetried,
    TaskCancelled,
    WorkflowCompleted,
    WorkflowFailed,
    StatusChanged,
    NotificationSent,
}

string_enum!(EventType {
    TaskScheduled => "task_scheduled",
    TaskStarted => "task_started",
    TaskCompleted => "task_completed",
    TaskFailed => "task_failed",
    TaskRetried => "task_retried",
    TaskCancelled => "task_cancelled",
    WorkflowCompleted => "workflow_completed",
    WorkflowFailed => "workflow_failed",
    StatusChanged => "status_changed",
    NotificationSent => "notification_sent",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

string_enum!(Severity { Info => "info", Warning => "warning", Error => "error", Critical => "critical" });

pub type EventDetails = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: i64,
    pub order_id: OrderId,
    pub task_id: Option<i64>,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub details: EventDetails,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkflowEvent {
    pub order_id: OrderId,
    pub task_id: Option<i64>,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub details: EventDetails,
    pub severity: Severity,
}

impl NewWorkflowEvent {
    pub fn new(order_id: OrderId, event_type: EventType, severity: Severity) -> Self {
        Self { order_id, task_id: None, event_type, timestamp: Utc::now(), details: EventDetails::new(), severity }
    }

    pub fn for_task(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Adds a scalar detail. Only scalars belong in the details bag, so arrays and objects are stored as their JSON
    /// text.
    pub fn with_detail<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        let value = match value.into() {
            v @ (Value::Array(_) | Value::Object(_)) => Value::String(v.to_string()),
            v => v,
        };
        self.details.insert(key.into(), value);
        self
    }
}

//--------------------------------------      Notification     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    StatusUpdate,
    WorkflowFailure,
    AutoTransition,
}

string_enum!(NotificationType {
    StatusUpdate => "status_update",
    WorkflowFailure => "workflow_failure",
    AutoTransition => "auto_transition",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: String,
    pub order_id: OrderId,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub read: bool,
    pub action_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: String,
    pub order_id: OrderId,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub action_url: Option<String>,
}

impl NewNotification {
    pub fn new<R, T, M>(
        recipient_id: R,
        order_id: OrderId,
        notification_type: NotificationType,
        title: T,
        message: M,
    ) -> Self
    where
        R: Into<String>,
        T: Into<String>,
        M: Into<String>,
    {
        Self {
            recipient_id: recipient_id.into(),
            order_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            priority: Priority::Normal,
            action_url: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action_url<S: Into<String>>(mut self, url: S) -> Self {
        self.action_url = Some(url.into());
        self
    }
}
