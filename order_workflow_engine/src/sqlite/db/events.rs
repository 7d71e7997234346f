use sqlx::{sqlite::SqliteRow, types::Json, FromRow, Row, SqliteConnection};

use super::parse_column;
use crate::db_types::{EventDetails, NewWorkflowEvent, OrderId, WorkflowEvent};

impl FromRow<'_, SqliteRow> for WorkflowEvent {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let order_id: String = row.try_get("order_id")?;
        let details: Json<EventDetails> = row.try_get("details")?;
        Ok(Self {
            id: row.try_get("id")?,
            order_id: OrderId(order_id),
            task_id: row.try_get("task_id")?,
            event_type: parse_column(row, "event_type")?,
            timestamp: row.try_get("timestamp")?,
            details: details.0,
            severity: parse_column(row, "severity")?,
        })
    }
}

pub async fn insert_event(event: NewWorkflowEvent, conn: &mut SqliteConnection) -> Result<WorkflowEvent, sqlx::Error> {
    let event = sqlx::query_as(
        r#"
            INSERT INTO workflow_events (order_id, task_id, event_type, timestamp, details, severity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(event.order_id.as_str())
    .bind(event.task_id)
    .bind(event.event_type.as_str())
    .bind(event.timestamp)
    .bind(Json(event.details))
    .bind(event.severity.as_str())
    .fetch_one(conn)
    .await?;
    Ok(event)
}

pub async fn fetch_events_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<WorkflowEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM workflow_events WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(events)
}
