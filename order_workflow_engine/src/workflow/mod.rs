//! # Order status workflow
//!
//! The pieces of the workflow engine, leaves first:
//!
//! * [`transitions`]: which status changes each role may make.
//! * [`conditions`]: declarative guards evaluated against an order.
//! * [`task_queue`] and [`retry`]: dispatch order and retry delays for persisted tasks.
//! * [`auto_transitions`]: follow-up transitions fired after a status change.
//! * [`engine`]: the [`WorkflowEngine`] that ties them together.
pub mod auto_transitions;
pub mod conditions;
pub mod config;
pub mod engine;
pub mod errors;
pub mod retry;
pub mod task_queue;
pub mod transitions;

pub use auto_transitions::{AutoTransitionRule, AutoTransitionRules};
pub use conditions::{ConditionEvaluator, ConditionOutcome, UnknownFieldPolicy};
pub use config::WorkflowConfig;
pub use engine::{DispatchSummary, RecoverySummary, TaskOutcome, TransitionOptions, WorkflowEngine};
pub use errors::{TaskExecutionError, WorkflowError};
pub use retry::{RetryBackoff, RetryPolicy};
pub use task_queue::TaskQueue;
pub use transitions::{is_valid_transition, next_allowed_statuses};
