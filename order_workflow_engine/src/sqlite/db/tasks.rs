use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{sqlite::SqliteRow, types::Json, FromRow, Row, SqliteConnection};

use super::parse_column;
use crate::{
    db_types::{Actor, NewWorkflowTask, OrderId, TaskStatus, WorkflowTask},
    traits::{OrderStoreError, TaskStatusCounts},
};

impl FromRow<'_, SqliteRow> for WorkflowTask {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let order_id: String = row.try_get("order_id")?;
        let actor = Actor { id: row.try_get("actor_id")?, role: parse_column(row, "actor_role")? };
        let metadata: Json<_> = row.try_get("metadata")?;
        let dependencies: Json<_> = row.try_get("dependencies")?;
        let conditions: Json<_> = row.try_get("conditions")?;
        Ok(Self {
            id: row.try_get("id")?,
            order_id: OrderId(order_id),
            action: parse_column(row, "action")?,
            target_status: parse_column(row, "target_status")?,
            actor,
            priority: parse_column(row, "priority")?,
            scheduled_at: row.try_get("scheduled_at")?,
            executed_at: row.try_get("executed_at")?,
            completed_at: row.try_get("completed_at")?,
            failed_at: row.try_get("failed_at")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            status: parse_column(row, "status")?,
            last_error: row.try_get("last_error")?,
            metadata: metadata.0,
            dependencies: dependencies.0,
            conditions: conditions.0,
            created_at: row.try_get("created_at")?,
        })
    }
}

pub async fn insert_task(
    task: NewWorkflowTask,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WorkflowTask, sqlx::Error> {
    let action = task.action();
    let task = sqlx::query_as(
        r#"
            INSERT INTO workflow_tasks (
                order_id,
                action,
                target_status,
                actor_id,
                actor_role,
                priority,
                scheduled_at,
                retry_count,
                max_retries,
                status,
                metadata,
                dependencies,
                conditions,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *;
        "#,
    )
    .bind(task.order_id.as_str())
    .bind(action.as_str())
    .bind(task.target_status.as_str())
    .bind(task.actor.id)
    .bind(task.actor.role.as_str())
    .bind(task.priority.as_str())
    .bind(task.scheduled_at)
    .bind(task.retry_count)
    .bind(task.max_retries)
    .bind(TaskStatus::Pending.as_str())
    .bind(Json(task.metadata))
    .bind(Json(task.dependencies))
    .bind(Json(task.conditions))
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    Ok(task)
}

pub async fn fetch_task(id: i64, conn: &mut SqliteConnection) -> Result<Option<WorkflowTask>, sqlx::Error> {
    let task = sqlx::query_as("SELECT * FROM workflow_tasks WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(task)
}

pub async fn fetch_tasks_by_status(
    status: TaskStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<WorkflowTask>, sqlx::Error> {
    let tasks = sqlx::query_as("SELECT * FROM workflow_tasks WHERE status = $1 ORDER BY id ASC")
        .bind(status.as_str())
        .fetch_all(conn)
        .await?;
    Ok(tasks)
}

pub async fn fetch_tasks_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<WorkflowTask>, sqlx::Error> {
    let tasks = sqlx::query_as("SELECT * FROM workflow_tasks WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(tasks)
}

/// Which timestamp (and error) a guarded status change writes.
pub enum TaskUpdate<'a> {
    Executing(DateTime<Utc>),
    Completed(DateTime<Utc>),
    Failed(DateTime<Utc>, &'a str),
    Cancelled,
    Requeued,
}

impl TaskUpdate<'_> {
    fn from_status(&self) -> TaskStatus {
        match self {
            TaskUpdate::Executing(_) | TaskUpdate::Cancelled => TaskStatus::Pending,
            TaskUpdate::Completed(_) | TaskUpdate::Failed(..) | TaskUpdate::Requeued => TaskStatus::Executing,
        }
    }

    fn to_status(&self) -> TaskStatus {
        match self {
            TaskUpdate::Executing(_) => TaskStatus::Executing,
            TaskUpdate::Completed(_) => TaskStatus::Completed,
            TaskUpdate::Failed(..) => TaskStatus::Failed,
            TaskUpdate::Cancelled => TaskStatus::Cancelled,
            TaskUpdate::Requeued => TaskStatus::Pending,
        }
    }
}

/// Moves a task to a new status, but only if it is currently in the status the update starts from.
///
/// Returns [`OrderStoreError::TaskNotFound`] or [`OrderStoreError::TaskStatusMismatch`] when the guard fails.
pub async fn update_task_status(
    id: i64,
    update: TaskUpdate<'_>,
    conn: &mut SqliteConnection,
) -> Result<WorkflowTask, OrderStoreError> {
    let from = update.from_status();
    let to = update.to_status();
    let query = match update {
        TaskUpdate::Executing(at) => {
            sqlx::query_as("UPDATE workflow_tasks SET status = $1, executed_at = $2 WHERE id = $3 AND status = $4 RETURNING *")
                .bind(to.as_str())
                .bind(at)
        },
        TaskUpdate::Completed(at) => {
            sqlx::query_as("UPDATE workflow_tasks SET status = $1, completed_at = $2 WHERE id = $3 AND status = $4 RETURNING *")
                .bind(to.as_str())
                .bind(at)
        },
        TaskUpdate::Failed(at, error) => sqlx::query_as(
            "UPDATE workflow_tasks SET status = $1, failed_at = $2, last_error = $3 WHERE id = $4 AND status = $5 RETURNING *",
        )
        .bind(to.as_str())
        .bind(at)
        .bind(error),
        TaskUpdate::Cancelled => {
            sqlx::query_as("UPDATE workflow_tasks SET status = $1 WHERE id = $2 AND status = $3 RETURNING *")
                .bind(to.as_str())
        },
        TaskUpdate::Requeued => sqlx::query_as(
            "UPDATE workflow_tasks SET status = $1, executed_at = NULL WHERE id = $2 AND status = $3 RETURNING *",
        )
        .bind(to.as_str()),
    };
    let updated: Option<WorkflowTask> = query.bind(id).bind(from.as_str()).fetch_optional(&mut *conn).await?;
    match updated {
        Some(task) => {
            trace!("📋️ Task #{id}: {from} -> {to}");
            Ok(task)
        },
        None => match fetch_task(id, conn).await? {
            Some(task) => Err(OrderStoreError::TaskStatusMismatch {
                id,
                expected: from,
                actual: task.status,
            }),
            None => Err(OrderStoreError::TaskNotFound(id)),
        },
    }
}

pub async fn task_status_counts(conn: &mut SqliteConnection) -> Result<TaskStatusCounts, OrderStoreError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM workflow_tasks GROUP BY status").fetch_all(conn).await?;
    let mut counts = TaskStatusCounts::default();
    for (status, count) in rows {
        let status = status.parse::<TaskStatus>().map_err(|e| OrderStoreError::ConversionError(e.to_string()))?;
        match status {
            TaskStatus::Pending => counts.pending = count,
            TaskStatus::Executing => counts.executing = count,
            TaskStatus::Completed => counts.completed = count,
            TaskStatus::Failed => counts.failed = count,
            TaskStatus::Cancelled => counts.cancelled = count,
        }
    }
    Ok(counts)
}
