use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{EventId, OutboxEvent},
    traits::{AckOutcome, NewOutboxEvent, OutboxApiError},
};

pub async fn insert_event(
    event: NewOutboxEvent,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OutboxEvent, sqlx::Error> {
    let row: OutboxEvent = sqlx::query_as(
        r#"
            INSERT INTO outbox_events (
                event_id,
                event_type,
                discord_id,
                server_id,
                vip_tier,
                created_at,
                processed
            ) VALUES ($1, $2, $3, $4, $5, $6, 0)
            RETURNING *;
        "#,
    )
    .bind(EventId::random())
    .bind(event.event_type)
    .bind(event.discord_id)
    .bind(event.server_id)
    .bind(event.vip_tier)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("📬️ Queued {} event {} for {}", row.event_type, row.event_id, row.discord_id);
    Ok(row)
}

/// All unprocessed events, oldest first.
pub async fn fetch_pending(conn: &mut SqliteConnection) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    let rows =
        sqlx::query_as("SELECT * FROM outbox_events WHERE processed = 0 ORDER BY id ASC").fetch_all(conn).await?;
    Ok(rows)
}

/// Flips the processed flag exactly once. The flip is a compare-and-swap on `processed = 0`, so a
/// repeat acknowledgement cannot overwrite the original processing timestamp.
pub async fn ack_event(
    event_id: &EventId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<AckOutcome, OutboxApiError> {
    let acked: Option<OutboxEvent> = sqlx::query_as(
        "UPDATE outbox_events SET processed = 1, processed_at = $2 WHERE event_id = $1 AND processed = 0 RETURNING *",
    )
    .bind(event_id.as_str())
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(event) = acked {
        debug!("📬️ Event {} acknowledged", event.event_id);
        return Ok(AckOutcome::Acked(event));
    }
    let existing: Option<OutboxEvent> = sqlx::query_as("SELECT * FROM outbox_events WHERE event_id = $1")
        .bind(event_id.as_str())
        .fetch_optional(conn)
        .await?;
    match existing {
        Some(event) => Ok(AckOutcome::AlreadyProcessed(event)),
        None => Err(OutboxApiError::EventNotFound(event_id.clone())),
    }
}

/// Deletes processed events older than the cutoff. Pending events always survive.
pub async fn purge_processed(cutoff: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM outbox_events WHERE processed = 1 AND processed_at IS NOT NULL AND unixepoch(processed_at) <= \
         unixepoch($1)",
    )
    .bind(cutoff)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
