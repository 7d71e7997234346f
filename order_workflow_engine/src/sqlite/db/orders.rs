use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, types::Json, FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use super::{order_counters, parse_column};
use crate::{
    db_types::{Amount, Milestones, NewOrder, Order, OrderId, OrderStatus},
    helpers::{format_order_id, order_id_period},
    traits::{
        ModifyOrderRequest,
        OrderQueryFilter,
        OrderSort,
        OrderSortField,
        OrderStoreError,
        Pagination,
        SortDirection,
        StatusUpdate,
    },
};

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let order_id: String = row.try_get("order_id")?;
        let screenshots: Json<Vec<String>> = row.try_get("screenshots")?;
        let timestamps: Json<Milestones> = row.try_get("timestamps")?;
        Ok(Self {
            id: row.try_get("id")?,
            order_id: OrderId(order_id),
            exchange_id: row.try_get("exchange_id")?,
            owner_id: row.try_get("owner_id")?,
            order_type: parse_column(row, "order_type")?,
            status: parse_column(row, "status")?,
            submitted_amount: Amount::from(row.try_get::<i64, _>("submitted_amount")?),
            commission: Amount::from(row.try_get::<i64, _>("commission")?),
            priority: parse_column(row, "priority")?,
            notes: row.try_get("notes")?,
            reason: row.try_get("reason")?,
            screenshots: screenshots.0,
            timestamps: timestamps.0,
        })
    }
}

/// Inserts a new order with status `Submitted`, allocating its order id from the monthly counter.
///
/// This is not atomic on its own. Embed the call inside a transaction and pass `&mut *tx` as the connection, so that
/// the counter increment and the insert commit or roll back together.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderStoreError> {
    let period = order_id_period(order.created_at);
    let seq = order_counters::next_sequence(&period, conn).await?;
    let order_id = format_order_id(&period, seq);
    trace!("📝️ Allocated order id {order_id}");
    let commission = order.commission();
    let timestamps = Milestones::new(order.created_at);
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                exchange_id,
                owner_id,
                order_type,
                status,
                submitted_amount,
                commission,
                priority,
                notes,
                screenshots,
                timestamps,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(order.exchange_id)
    .bind(order.owner_id)
    .bind(order.order_type.as_str())
    .bind(OrderStatus::Submitted.as_str())
    .bind(order.submitted_amount.value())
    .bind(commission.value())
    .bind(order.priority.as_str())
    .bind(order.notes)
    .bind(Json(order.screenshots))
    .bind(Json(timestamps))
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order [{}] inserted with id {}", order.order_id, order.id);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Writes the new status and milestones, guarded on the status the caller validated against. A reason on the update
/// replaces the order's. The order's notes belong to the exchange and are left alone; per-transition notes live in the
/// workflow action record. Returns `None` if the order no longer holds `expected`.
pub(crate) async fn update_order_status(
    update: &StatusUpdate,
    expected: OrderStatus,
    timestamps: &Milestones,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                timestamps = $2,
                updated_at = $3,
                reason = COALESCE($4, reason)
            WHERE order_id = $5 AND status = $6
            RETURNING *;
        "#,
    )
    .bind(update.new_status.as_str())
    .bind(Json(timestamps))
    .bind(now)
    .bind(update.reason.as_deref())
    .bind(update.order_id.as_str())
    .bind(expected.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Applies field edits to an order. The caller is responsible for checking that the order may be edited.
pub(crate) async fn update_order(
    existing: &Order,
    update: ModifyOrderRequest,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderStoreError> {
    if update.is_empty() {
        debug!("📝️ No fields to update for order {}. Update request skipped.", existing.order_id);
        return Err(OrderStoreError::OrderModificationNoOp);
    }
    let mut timestamps = existing.timestamps.clone();
    timestamps.touch(now);
    let commission = recalculate_commission(existing, &update);
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET ");
    let mut set_clause = builder.separated(", ");
    set_clause.push("updated_at = ");
    set_clause.push_bind_unseparated(now);
    set_clause.push("timestamps = ");
    set_clause.push_bind_unseparated(Json(timestamps));
    if let Some(amount) = update.new_amount {
        set_clause.push("submitted_amount = ");
        set_clause.push_bind_unseparated(amount.value());
    }
    if let Some(commission) = commission {
        set_clause.push("commission = ");
        set_clause.push_bind_unseparated(commission.value());
    }
    if let Some(notes) = update.new_notes {
        set_clause.push("notes = ");
        set_clause.push_bind_unseparated(notes);
    }
    if let Some(priority) = update.new_priority {
        set_clause.push("priority = ");
        set_clause.push_bind_unseparated(priority.as_str());
    }
    if !update.add_screenshots.is_empty() {
        let mut screenshots = existing.screenshots.clone();
        screenshots.extend(update.add_screenshots);
        set_clause.push("screenshots = ");
        set_clause.push_bind_unseparated(Json(screenshots));
    }
    builder.push(" WHERE order_id = ");
    builder.push_bind(existing.order_id.as_str().to_string());
    builder.push(" RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let order = builder
        .build_query_as::<Order>()
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| OrderStoreError::OrderNotFound(existing.order_id.clone()))?;
    Ok(order)
}

/// The commission after an edit: recomputed at the new rate if one was given, otherwise rescaled to the new amount at
/// the order's existing effective rate. `None` if the commission does not change.
fn recalculate_commission(existing: &Order, update: &ModifyOrderRequest) -> Option<Amount> {
    let amount = update.new_amount.unwrap_or(existing.submitted_amount);
    match (update.new_commission_rate_bps, update.new_amount) {
        (Some(bps), _) => Some(amount.apply_rate_bps(bps)),
        (None, Some(new_amount)) => {
            let old = i128::from(existing.submitted_amount.value());
            if old == 0 {
                return Some(Amount::from(0));
            }
            let scaled = i128::from(existing.commission.value()) * i128::from(new_amount.value()) / old;
            Some(Amount::from(scaled.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64))
        },
        (None, None) => None,
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &OrderQueryFilter) {
    if filter.is_empty() {
        return;
    }
    builder.push(" WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(exchange_id) = &filter.exchange_id {
        where_clause.push("exchange_id = ");
        where_clause.push_bind_unseparated(exchange_id.clone());
    }
    if let Some(owner_id) = &filter.owner_id {
        where_clause.push("owner_id = ");
        where_clause.push_bind_unseparated(owner_id.clone());
    }
    if let Some(order_type) = filter.order_type {
        where_clause.push("order_type = ");
        where_clause.push_bind_unseparated(order_type.as_str());
    }
    if !filter.statuses.is_empty() {
        // statuses come from a closed set of identifiers, so they can be inlined
        let statuses = filter.statuses.iter().map(|s| format!("'{}'", s.as_str())).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(priority) = filter.priority {
        where_clause.push("priority = ");
        where_clause.push_bind_unseparated(priority.as_str());
    }
    if let Some(since) = filter.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = filter.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
}

fn order_by_clause(sort: OrderSort) -> String {
    let column = match sort.field {
        OrderSortField::CreatedAt => "created_at",
        OrderSortField::UpdatedAt => "updated_at",
        OrderSortField::Amount => "submitted_amount",
        OrderSortField::Priority => {
            "CASE priority WHEN 'low' THEN 0 WHEN 'normal' THEN 1 WHEN 'high' THEN 2 WHEN 'critical' THEN 3 END"
        },
    };
    let direction = match sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    format!(" ORDER BY {column} {direction}, id {direction}")
}

/// Fetches one page of the orders matching the filter, together with the total number of matches.
pub async fn search_orders(
    filter: &OrderQueryFilter,
    sort: OrderSort,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<(Vec<Order>, i64), sqlx::Error> {
    let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM orders");
    push_filter(&mut count_query, filter);
    let total: i64 = count_query.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM orders");
    push_filter(&mut builder, filter);
    builder.push(order_by_clause(sort));
    builder.push(" LIMIT ");
    builder.push_bind(i64::from(pagination.page_size));
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset());
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {} of {total}", orders.len());
    Ok((orders, total))
}
