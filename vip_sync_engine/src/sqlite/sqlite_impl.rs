//! `SqliteDatabase` is a concrete implementation of a VIP sync engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Every mutation runs inside an explicitly committed transaction on one pooled connection: multi-store
//! flows (webhook processing, session consumption, the expiry sweep) for atomicity, and single-statement writes so
//! the write is finalized before the connection goes back to the pool. Reads come straight off the pool.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, entitlements, link_sessions, new_pool, orders, outbox};
use crate::{
    db_types::{
        vip_term,
        DiscordId,
        Entitlement,
        EntitlementKey,
        EntitlementUpdate,
        EventId,
        LinkSession,
        NewOrder,
        Order,
        OrderId,
        OutboxEvent,
        PaymentStatus,
        ServerId,
        SessionId,
        SteamId,
    },
    traits::{
        AckOutcome,
        DemotedVip,
        EntitlementApiError,
        EntitlementManagement,
        LinkedIdentity,
        NewOutboxEvent,
        OutboxApiError,
        OutboxManagement,
        PaymentUpdateOutcome,
        VipGatewayDatabase,
        VipGatewayError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database api using the URL in the `VSS_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies any outstanding schema migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }
}

impl EntitlementManagement for SqliteDatabase {
    async fn upsert_entitlement(
        &self,
        server_id: &ServerId,
        update: EntitlementUpdate,
    ) -> Result<Entitlement, EntitlementApiError> {
        let mut tx = self.pool.begin().await?;
        let entitlement = entitlements::upsert(server_id, update, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Entitlement record {} on {server_id} has been upserted", entitlement.id);
        Ok(entitlement)
    }

    async fn fetch_entitlement(
        &self,
        server_id: &ServerId,
        key: &EntitlementKey,
    ) -> Result<Option<Entitlement>, EntitlementApiError> {
        let mut conn = self.pool.acquire().await?;
        let entitlement = entitlements::fetch_entitlement(server_id, key, &mut conn).await?;
        Ok(entitlement)
    }

    async fn fetch_entitlements_for_server(
        &self,
        server_id: &ServerId,
    ) -> Result<Vec<Entitlement>, EntitlementApiError> {
        let mut conn = self.pool.acquire().await?;
        let entitlements = entitlements::fetch_all_for_server(server_id, &mut conn).await?;
        Ok(entitlements)
    }

    async fn clear_vip(&self, server_id: &ServerId, steam_id: &SteamId) -> Result<Entitlement, EntitlementApiError> {
        let mut tx = self.pool.begin().await?;
        let cleared = entitlements::clear_vip(server_id, steam_id, Utc::now(), &mut tx).await?;
        let entitlement = cleared.ok_or_else(|| EntitlementApiError::PlayerNotFound(steam_id.clone()))?;
        tx.commit().await?;
        debug!("🗃️ VIP grant cleared for steam id {steam_id} on {server_id}");
        Ok(entitlement)
    }
}

impl OutboxManagement for SqliteDatabase {
    async fn enqueue_event(&self, event: NewOutboxEvent) -> Result<OutboxEvent, OutboxApiError> {
        let mut tx = self.pool.begin().await?;
        let event = outbox::insert_event(event, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn fetch_pending_events(&self) -> Result<Vec<OutboxEvent>, OutboxApiError> {
        let mut conn = self.pool.acquire().await?;
        let events = outbox::fetch_pending(&mut conn).await?;
        Ok(events)
    }

    async fn ack_event(&self, event_id: &EventId, now: DateTime<Utc>) -> Result<AckOutcome, OutboxApiError> {
        let mut tx = self.pool.begin().await?;
        let outcome = outbox::ack_event(event_id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn purge_processed_events(&self, cutoff: DateTime<Utc>) -> Result<u64, OutboxApiError> {
        let mut tx = self.pool.begin().await?;
        let removed = outbox::purge_processed(cutoff, &mut tx).await?;
        tx.commit().await?;
        if removed > 0 {
            debug!("🗃️ Purged {removed} processed outbox events older than {cutoff}");
        }
        Ok(removed)
    }
}

impl VipGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), VipGatewayError> {
        let mut tx = self.pool.begin().await?;
        let (order, inserted) = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        if inserted {
            debug!("🗃️ Order [{}] has been saved in the DB with id {}", order.order_id, order.id);
        }
        Ok((order, inserted))
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, VipGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, VipGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_idempotency_key(key, &mut conn).await?;
        Ok(order)
    }

    async fn process_payment_update(
        &self,
        order_id: &OrderId,
        transaction_id: &str,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentUpdateOutcome, VipGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| VipGatewayError::OrderNotFound(order_id.clone()))?;
        // Re-delivery of a payment that already credited VIP time. The check runs against the
        // credited set, not the order's last recorded status, so an intervening delivery with
        // some other status cannot reopen the door.
        if status.is_success() && orders::transaction_already_credited(order.id, transaction_id, &mut tx).await? {
            return Err(VipGatewayError::DuplicateTransaction {
                order_id: order_id.clone(),
                transaction_id: transaction_id.to_string(),
            });
        }
        let order = orders::record_payment_update(order.id, transaction_id, status, now, &mut tx).await?;
        let outcome = if status.is_success() {
            orders::record_credited_transaction(&order, transaction_id, now, &mut tx).await?;
            let entitlement =
                entitlements::extend_vip(&order.server_id, &order.discord_id, order.vip_tier, vip_term(), now, &mut tx)
                    .await?;
            let event = outbox::insert_event(
                NewOutboxEvent::payment_confirmed(order.discord_id.clone(), order.server_id.clone(), order.vip_tier),
                now,
                &mut tx,
            )
            .await?;
            debug!(
                "🗃️ Order [{}] is now {}. VIP for {} on {} runs to {:?}",
                order.order_id, order.status, order.discord_id, order.server_id, entitlement.vip_expires_at
            );
            PaymentUpdateOutcome { order, entitlement: Some(entitlement), event: Some(event) }
        } else {
            debug!("🗃️ Order [{}] status recorded as {}", order.order_id, order.status);
            PaymentUpdateOutcome { order, entitlement: None, event: None }
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn expire_vip_entitlements(
        &self,
        server_id: &ServerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<DemotedVip>, VipGatewayError> {
        let mut tx = self.pool.begin().await?;
        let lapsed = entitlements::fetch_lapsed(server_id, now, &mut tx).await?;
        if lapsed.is_empty() {
            return Ok(Vec::new());
        }
        let mut demoted = Vec::with_capacity(lapsed.len());
        for record in lapsed {
            // fetch_lapsed only returns rows with a tier set
            let prior_tier = match record.vip_tier {
                Some(tier) => tier,
                None => continue,
            };
            entitlements::demote(record.id, now, &mut tx).await?;
            if let Some(discord_id) = record.discord_id.clone() {
                outbox::insert_event(
                    NewOutboxEvent::vip_expired(discord_id, server_id.clone(), prior_tier),
                    now,
                    &mut tx,
                )
                .await?;
            }
            demoted.push(DemotedVip::from_entitlement(&record, prior_tier));
        }
        tx.commit().await?;
        info!("🗃️ Expiry sweep demoted {} record(s) on {server_id}", demoted.len());
        Ok(demoted)
    }

    async fn create_link_session(
        &self,
        discord_id: &DiscordId,
        server_id: &ServerId,
    ) -> Result<LinkSession, VipGatewayError> {
        let mut tx = self.pool.begin().await?;
        let session = link_sessions::insert_session(discord_id, server_id, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(session)
    }

    async fn consume_link_session(
        &self,
        session_id: &SessionId,
        steam_id: &SteamId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<LinkedIdentity, VipGatewayError> {
        let mut tx = self.pool.begin().await?;
        let session = link_sessions::consume_session(session_id, steam_id, ttl, now, &mut tx).await?;
        let update = EntitlementUpdate::link(session.discord_id.clone(), steam_id.clone());
        let entitlement = entitlements::upsert(&session.server_id, update, now, &mut tx).await?;
        let event = outbox::insert_event(
            NewOutboxEvent::steam_linked(session.discord_id.clone(), session.server_id.clone()),
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        debug!(
            "🗃️ Steam id {steam_id} is now linked to {} on {} (session {})",
            session.discord_id, session.server_id, session.session_id
        );
        Ok(LinkedIdentity { session, entitlement, event })
    }

    async fn prune_link_sessions(&self, ttl: Duration, now: DateTime<Utc>) -> Result<u64, VipGatewayError> {
        let mut tx = self.pool.begin().await?;
        let removed = link_sessions::prune_sessions(ttl, now, &mut tx).await?;
        tx.commit().await?;
        if removed > 0 {
            debug!("🗃️ Pruned {removed} spent or stale link sessions");
        }
        Ok(removed)
    }

    async fn close(&mut self) -> Result<(), VipGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}
