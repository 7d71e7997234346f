//! Transient dispatch ordering for workflow tasks.
//!
//! The persisted task table is the only source of truth. A [`TaskQueue`] is built from the current `Pending` set for
//! each dispatch round and thrown away afterwards, so nothing in memory can drift from the store across a restart.
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use chrono::{DateTime, Utc};

use crate::db_types::{OrderId, TaskStatus, WorkflowTask};

#[derive(Debug, Clone)]
struct QueuedTask(WorkflowTask);

/// Higher priority first, then earlier `scheduled_at`, then lower id.
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.scheduled_at.cmp(&self.0.scheduled_at))
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
}

impl TaskQueue {
    /// Builds a queue from the given tasks. Anything that is not `Pending` is ignored.
    pub fn from_pending<I: IntoIterator<Item = WorkflowTask>>(tasks: I) -> Self {
        let heap = tasks.into_iter().filter(|t| t.status == TaskStatus::Pending).map(QueuedTask).collect();
        Self { heap }
    }

    pub fn pop(&mut self) -> Option<WorkflowTask> {
        self.heap.pop().map(|q| q.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drains the queue, returning the tasks that are due at `now` in dispatch order. Tasks scheduled for later are
    /// left in the queue.
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<WorkflowTask> {
        let mut due = Vec::with_capacity(self.heap.len());
        let mut later = Vec::new();
        while let Some(task) = self.pop() {
            if task.scheduled_at <= now {
                due.push(task);
            } else {
                later.push(QueuedTask(task));
            }
        }
        self.heap.extend(later);
        due
    }
}

/// Groups tasks by order, keeping dispatch order both across groups (by each order's first task) and within them.
pub fn group_by_order(tasks: Vec<WorkflowTask>) -> Vec<(OrderId, Vec<WorkflowTask>)> {
    let mut index: HashMap<OrderId, usize> = HashMap::new();
    let mut groups: Vec<(OrderId, Vec<WorkflowTask>)> = Vec::new();
    for task in tasks {
        match index.get(&task.order_id) {
            Some(&i) => groups[i].1.push(task),
            None => {
                index.insert(task.order_id.clone(), groups.len());
                groups.push((task.order_id.clone(), vec![task]));
            },
        }
    }
    groups
}
