//! Unified API for the notification outbox.

use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{EventId, OutboxEvent},
    traits::{AckOutcome, OutboxApiError, OutboxManagement},
};

/// The `OutboxApi` is the Discord bot's view of the notification queue. The bot polls for pending events, delivers
/// them, and acknowledges each one; delivery is at-least-once, so acknowledgement is idempotent.
pub struct OutboxApi<B> {
    db: B,
}

impl<B> Debug for OutboxApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OutboxApi")
    }
}

impl<B> OutboxApi<B>
where B: OutboxManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// All unprocessed events, oldest first.
    pub async fn pending_events(&self) -> Result<Vec<OutboxEvent>, OutboxApiError> {
        self.db.fetch_pending_events().await
    }

    /// Acknowledges an event. A repeat acknowledgement succeeds and keeps the original processing timestamp.
    pub async fn ack(&self, event_id: &EventId) -> Result<AckOutcome, OutboxApiError> {
        let outcome = self.db.ack_event(event_id, Utc::now()).await?;
        if outcome.was_first_ack() {
            debug!("📬️ Event {event_id} acknowledged");
        } else {
            debug!("📬️ Event {event_id} was already acknowledged. Nothing to do.");
        }
        Ok(outcome)
    }

    /// Deletes processed events older than the retention window. Pending events are never touched.
    pub async fn purge_processed(&self, retention: Duration) -> Result<u64, OutboxApiError> {
        let cutoff = Utc::now() - retention;
        self.db.purge_processed_events(cutoff).await
    }
}
