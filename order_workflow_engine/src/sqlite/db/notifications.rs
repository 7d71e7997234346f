use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::parse_column;
use crate::db_types::{NewNotification, Notification, OrderId};

impl FromRow<'_, SqliteRow> for Notification {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let order_id: String = row.try_get("order_id")?;
        Ok(Self {
            id: row.try_get("id")?,
            recipient_id: row.try_get("recipient_id")?,
            order_id: OrderId(order_id),
            notification_type: parse_column(row, "notification_type")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            priority: parse_column(row, "priority")?,
            read: row.try_get("read")?,
            action_url: row.try_get("action_url")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

pub async fn insert_notification(
    notification: NewNotification,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Notification, sqlx::Error> {
    let notification = sqlx::query_as(
        r#"
            INSERT INTO notifications (
                recipient_id,
                order_id,
                notification_type,
                title,
                message,
                priority,
                action_url,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(notification.recipient_id)
    .bind(notification.order_id.as_str())
    .bind(notification.notification_type.as_str())
    .bind(notification.title)
    .bind(notification.message)
    .bind(notification.priority.as_str())
    .bind(notification.action_url)
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    Ok(notification)
}

/// Notifications for a user, newest first.
pub async fn fetch_notifications_for_user(
    recipient_id: &str,
    unread_only: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, sqlx::Error> {
    let sql = if unread_only {
        "SELECT * FROM notifications WHERE recipient_id = $1 AND read = FALSE ORDER BY created_at DESC, id DESC"
    } else {
        "SELECT * FROM notifications WHERE recipient_id = $1 ORDER BY created_at DESC, id DESC"
    };
    let notifications = sqlx::query_as(sql).bind(recipient_id).fetch_all(conn).await?;
    Ok(notifications)
}

pub async fn mark_notification_read(id: i64, conn: &mut SqliteConnection) -> Result<Option<Notification>, sqlx::Error> {
    let notification = sqlx::query_as("UPDATE notifications SET read = TRUE WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(notification)
}
