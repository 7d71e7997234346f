//! # Storage contracts
//!
//! The workflow engine never talks to a database directly. It consumes two backend traits:
//!
//! * [`OrderManagement`] is the order store adapter: lookups, listing, field edits, and the transactional status update
//!   that re-validates every transition against the live status.
//! * [`WorkflowStorage`] persists workflow tasks (the durable queue), the append-only event log and user
//!   notifications.
//!
//! [`crate::SqliteDatabase`] implements both.
mod data_objects;
mod order_management;
mod workflow_storage;

pub use data_objects::{
    ModifyOrderRequest,
    OrderChanged,
    OrderPage,
    OrderQueryFilter,
    OrderSort,
    OrderSortField,
    Pagination,
    SortDirection,
    StatusUpdate,
    TaskStatusCounts,
    DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use order_management::{OrderManagement, OrderStoreError};
pub use workflow_storage::WorkflowStorage;
