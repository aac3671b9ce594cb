use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus, ServerId, ServerRegistry},
    traits::{PaymentUpdateOutcome, SweepResult, VipGatewayDatabase, VipGatewayError},
};

/// `OrderFlowApi` is the primary API for the purchase flow. It records checkout orders, applies payment provider
/// webhooks to the ledger and entitlement store, and drives the periodic VIP expiry sweep.
pub struct OrderFlowApi<B> {
    db: B,
    registry: ServerRegistry,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, registry: ServerRegistry) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Checks the server id against the registry. Call this before doing any work on behalf of a
    /// request, in particular before contacting the payment provider.
    pub fn ensure_known_server(&self, server_id: &ServerId) -> Result<(), VipGatewayError> {
        if self.registry.contains(server_id) {
            Ok(())
        } else {
            Err(VipGatewayError::UnsupportedServer(server_id.clone()))
        }
    }
}

impl<B> OrderFlowApi<B>
where B: VipGatewayDatabase
{
    /// Records a new checkout order in the ledger.
    ///
    /// The write is idempotent on the caller-supplied idempotency key: a retry with the same key returns the stored
    /// order and reports `false` for the inserted flag. Re-using an order id without a key is an error.
    pub async fn process_new_order(&self, order: NewOrder) -> Result<(Order, bool), VipGatewayError> {
        self.ensure_known_server(&order.server_id)?;
        let (order, inserted) = self.db.insert_order(order).await?;
        if inserted {
            debug!("🔄️📦️ Order [{}] recorded for {} on {}", order.order_id, order.discord_id, order.server_id);
        } else {
            debug!("🔄️📦️ Order [{}] replayed from the ledger without a new insert", order.order_id);
        }
        Ok((order, inserted))
    }

    pub async fn order_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, VipGatewayError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, VipGatewayError> {
        self.db.fetch_order_by_idempotency_key(key).await
    }

    /// Applies a payment provider webhook to the ledger.
    ///
    /// On a success-class status the matching entitlement is extended by one VIP term and a `PAYMENT_CONFIRMED`
    /// event is queued, all in the same transaction as the status update. Any other status is recorded on the order
    /// with no side effects. A webhook that repeats a transaction that already credited VIP time surfaces as
    /// [`VipGatewayError::DuplicateTransaction`] and changes nothing, no matter what status was recorded since.
    pub async fn process_payment_update(
        &self,
        order_id: &OrderId,
        transaction_id: &str,
        status: PaymentStatus,
    ) -> Result<PaymentUpdateOutcome, VipGatewayError> {
        trace!("🔄️💰️ Processing {status} update for order [{order_id}], transaction {transaction_id}");
        let outcome = self.db.process_payment_update(order_id, transaction_id, status, Utc::now()).await?;
        if outcome.confirmed() {
            debug!("🔄️💰️ Order [{order_id}] is paid. Entitlement extended and notification queued.");
        } else {
            debug!("🔄️💰️ Order [{order_id}] status recorded as {status}. No entitlement change.");
        }
        Ok(outcome)
    }

    /// Sweeps every server in the registry for lapsed VIP grants and demotes them.
    ///
    /// A failure on one server does not stop the sweep. The per-server errors come back in the result so the caller
    /// can log them and carry on.
    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> SweepResult {
        let mut result = SweepResult::default();
        for server_id in self.registry.servers() {
            match self.db.expire_vip_entitlements(server_id, now).await {
                Ok(mut demoted) => result.demoted.append(&mut demoted),
                Err(e) => {
                    warn!("🔄️🧹️ Expiry sweep failed on {server_id}: {e}");
                    result.failures.push((server_id.clone(), e.to_string()));
                },
            }
        }
        if result.demoted_count() > 0 {
            debug!("🔄️🧹️ Expiry sweep demoted {} VIP grant(s) across the registry", result.demoted_count());
        }
        result
    }
}
