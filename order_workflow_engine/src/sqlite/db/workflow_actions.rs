use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::parse_column;
use crate::{
    db_types::{OrderId, OrderStatus, WorkflowAction},
    traits::StatusUpdate,
};

impl FromRow<'_, SqliteRow> for WorkflowAction {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let order_id: String = row.try_get("order_id")?;
        Ok(Self {
            id: row.try_get("id")?,
            order_id: OrderId(order_id),
            from_status: parse_column(row, "from_status")?,
            to_status: parse_column(row, "to_status")?,
            actor_id: row.try_get("actor_id")?,
            actor_role: parse_column(row, "actor_role")?,
            notes: row.try_get("notes")?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Appends the audit record for a status change. Call this in the same transaction as the status write.
pub async fn insert_action(
    from_status: OrderStatus,
    update: &StatusUpdate,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WorkflowAction, sqlx::Error> {
    let action = sqlx::query_as(
        r#"
            INSERT INTO workflow_actions (order_id, from_status, to_status, actor_id, actor_role, notes, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(update.order_id.as_str())
    .bind(from_status.as_str())
    .bind(update.new_status.as_str())
    .bind(update.actor.id.as_str())
    .bind(update.actor.role.as_str())
    .bind(update.notes.as_deref())
    .bind(update.reason.as_deref())
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    Ok(action)
}

pub async fn fetch_actions_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<WorkflowAction>, sqlx::Error> {
    let actions = sqlx::query_as("SELECT * FROM workflow_actions WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(actions)
}
