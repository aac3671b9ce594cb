use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    db_types::{DiscordId, LinkSession, NewOrder, Order, OrderId, PaymentStatus, ServerId, SessionId, SteamId},
    traits::{
        data_objects::{DemotedVip, LinkedIdentity, PaymentUpdateOutcome},
        EntitlementApiError,
        EntitlementManagement,
        OutboxApiError,
        OutboxManagement,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the VIP sync engine.
///
/// This behaviour includes:
/// * The append-mostly order ledger fed by checkout.
/// * Applying payment webhooks: ledger update, entitlement extension and notification in one
///   atomic transaction.
/// * The expiry sweep that demotes lapsed VIPs.
/// * Single-use linking sessions binding Discord members to Steam identities.
#[allow(async_fn_in_trait)]
pub trait VipGatewayDatabase: Clone + EntitlementManagement + OutboxManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new pending order. The call is idempotent on the order's idempotency key: when
    /// the key is already present the stored order is returned and the second element is `false`.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), VipGatewayError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, VipGatewayError>;

    async fn fetch_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, VipGatewayError>;

    /// Applies a payment webhook to the ledger in a single transaction.
    ///
    /// The transaction id and normalised status are always recorded on the order. When the status
    /// is success-class, the matching entitlement is extended by the VIP term (additive on top of
    /// any remaining time) and a `PAYMENT_CONFIRMED` event is queued, all atomically.
    ///
    /// Every transaction that credits VIP time is remembered against the order. A success-class
    /// webhook repeating a remembered transaction is a re-delivery: nothing is touched and
    /// [`VipGatewayError::DuplicateTransaction`] is returned, regardless of which status the
    /// provider reported for the order in between. A different transaction id counts as a
    /// further payment and extends again.
    async fn process_payment_update(
        &self,
        order_id: &OrderId,
        transaction_id: &str,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentUpdateOutcome, VipGatewayError>;

    /// Demotes every record on the server whose grant has lapsed at `now`, queueing a
    /// `VIP_EXPIRED` event for each demoted record that has a Discord binding. Runs in a single
    /// transaction; a sweep that finds nothing writes nothing.
    async fn expire_vip_entitlements(
        &self,
        server_id: &ServerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<DemotedVip>, VipGatewayError>;

    async fn create_link_session(
        &self,
        discord_id: &DiscordId,
        server_id: &ServerId,
    ) -> Result<LinkSession, VipGatewayError>;

    /// Consumes a linking session exactly once. The used check and the mark are a single
    /// compare-and-swap, so one of two concurrent consumers always loses. On success, the same
    /// transaction binds the Steam identity to the member's entitlement record and queues a
    /// `STEAM_LINKED` event.
    async fn consume_link_session(
        &self,
        session_id: &SessionId,
        steam_id: &SteamId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<LinkedIdentity, VipGatewayError>;

    /// Deletes used sessions and sessions older than `ttl`. Returns the number of rows removed.
    async fn prune_link_sessions(&self, ttl: Duration, now: DateTime<Utc>) -> Result<u64, VipGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), VipGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum VipGatewayError {
    #[error("We have an internal database engine error: {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Transaction {transaction_id} has already been applied to order {order_id}")]
    DuplicateTransaction { order_id: OrderId, transaction_id: String },
    #[error("Link session {0} does not exist")]
    SessionNotFound(SessionId),
    #[error("Link session {0} has already been used")]
    SessionAlreadyUsed(SessionId),
    #[error("Link session {0} has expired")]
    SessionExpired(SessionId),
    #[error("Server {0} is not in the registry")]
    UnsupportedServer(ServerId),
    #[error("{0}")]
    EntitlementError(#[from] EntitlementApiError),
    #[error("{0}")]
    OutboxError(#[from] OutboxApiError),
}

impl From<sqlx::Error> for VipGatewayError {
    fn from(e: sqlx::Error) -> Self {
        VipGatewayError::DatabaseError(e.to_string())
    }
}
