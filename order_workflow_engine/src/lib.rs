//! Order Workflow Engine
//!
//! The order workflow engine drives money-exchange orders through their status lifecycle. Exchanges submit
//! `incoming` and `outgoing` transfer orders, and administrators review and progress them until they are completed
//! or cancelled.
//!
//! The library is divided into the following sections:
//! 1. Data types ([`mod@db_types`]) and the storage contracts the engine consumes ([`mod@traits`]). Backends need to
//!    implement [`OrderManagement`] and [`WorkflowStorage`] in order to act as a backend for the engine. A SQLite
//!    backend, [`SqliteDatabase`], is provided.
//! 2. The workflow itself ([`mod@workflow`]): the transition rules, the condition evaluator, the task queue, and the
//!    [`WorkflowEngine`] that schedules and executes status changes with retries and auto-transitions.
//! 3. Events ([`mod@events`]) and live order monitoring ([`mod@monitor`]). Every committed order change is published
//!    on an event channel, which an [`OrderMonitor`] can use to push updates to subscribers.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod monitor;
pub mod traits;
pub mod workflow;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

pub use monitor::{OrderMonitor, SubscriptionId, Subscriber};
#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
pub use traits::{OrderManagement, OrderStoreError, WorkflowStorage};
pub use workflow::{TransitionOptions, WorkflowConfig, WorkflowEngine, WorkflowError};
