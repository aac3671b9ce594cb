use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{EventId, OutboxEvent},
    traits::data_objects::{AckOutcome, NewOutboxEvent},
};

#[derive(Debug, Clone, Error)]
pub enum OutboxApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No event with id {0}")]
    EventNotFound(EventId),
}

impl From<sqlx::Error> for OutboxApiError {
    fn from(e: sqlx::Error) -> Self {
        OutboxApiError::DatabaseError(e.to_string())
    }
}

/// The `OutboxManagement` trait defines the at-least-once notification queue consumed by the
/// Discord bot. Events are appended in FIFO order and stay pending until acknowledged.
#[allow(async_fn_in_trait)]
pub trait OutboxManagement {
    async fn enqueue_event(&self, event: NewOutboxEvent) -> Result<OutboxEvent, OutboxApiError>;

    /// All unprocessed events in insertion order.
    async fn fetch_pending_events(&self) -> Result<Vec<OutboxEvent>, OutboxApiError>;

    /// Marks the event as processed. Repeat acknowledgements succeed without touching the stored
    /// processing timestamp; an unknown event id is an error.
    async fn ack_event(&self, event_id: &EventId, now: DateTime<Utc>) -> Result<AckOutcome, OutboxApiError>;

    /// Deletes processed events whose processing timestamp is older than `cutoff`. Pending events
    /// are never deleted. Returns the number of rows removed.
    async fn purge_processed_events(&self, cutoff: DateTime<Utc>) -> Result<u64, OutboxApiError>;
}
