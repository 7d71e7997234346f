use sqlx::SqliteConnection;

/// Increments and returns the order sequence number for the given `YYMM` period. The first order in a period gets 1.
///
/// Run this inside the same transaction as the order insert, so that a rolled back insert also rolls back the
/// counter.
pub async fn next_sequence(period: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let seq: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO order_counters (period, seq) VALUES ($1, 1)
            ON CONFLICT (period) DO UPDATE SET seq = seq + 1
            RETURNING seq;
        "#,
    )
    .bind(period)
    .fetch_one(conn)
    .await?;
    Ok(seq)
}
