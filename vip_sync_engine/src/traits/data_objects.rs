use serde::{Deserialize, Serialize};

use crate::db_types::{
    DiscordId,
    Entitlement,
    EventType,
    LinkSession,
    Order,
    OutboxEvent,
    ServerId,
    SteamId,
    VipTier,
};

//--------------------------------------   NewOutboxEvent     ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutboxEvent {
    pub event_type: EventType,
    pub discord_id: DiscordId,
    pub server_id: ServerId,
    pub vip_tier: Option<VipTier>,
}

impl NewOutboxEvent {
    pub fn steam_linked(discord_id: DiscordId, server_id: ServerId) -> Self {
        Self { event_type: EventType::SteamLinked, discord_id, server_id, vip_tier: None }
    }

    pub fn payment_confirmed(discord_id: DiscordId, server_id: ServerId, tier: VipTier) -> Self {
        Self { event_type: EventType::PaymentConfirmed, discord_id, server_id, vip_tier: Some(tier) }
    }

    pub fn vip_expired(discord_id: DiscordId, server_id: ServerId, prior_tier: VipTier) -> Self {
        Self { event_type: EventType::VipExpired, discord_id, server_id, vip_tier: Some(prior_tier) }
    }
}

//--------------------------------------      DemotedVip      ---------------------------------------------------------
/// One record cleared by the expiry sweep, carrying the tier it held before demotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemotedVip {
    pub entitlement_id: i64,
    pub server_id: ServerId,
    pub discord_id: Option<DiscordId>,
    pub steam_id: Option<SteamId>,
    pub prior_tier: VipTier,
}

impl DemotedVip {
    pub fn from_entitlement(entitlement: &Entitlement, prior_tier: VipTier) -> Self {
        Self {
            entitlement_id: entitlement.id,
            server_id: entitlement.server_id.clone(),
            discord_id: entitlement.discord_id.clone(),
            steam_id: entitlement.steam_id.clone(),
            prior_tier,
        }
    }
}

//-------------------------------------- PaymentUpdateOutcome ---------------------------------------------------------
/// The result of applying a webhook to the ledger. On a success-class status the extended
/// entitlement and the queued notification come back alongside the updated order; otherwise only
/// the order changed.
#[derive(Debug, Clone)]
pub struct PaymentUpdateOutcome {
    pub order: Order,
    pub entitlement: Option<Entitlement>,
    pub event: Option<OutboxEvent>,
}

impl PaymentUpdateOutcome {
    pub fn confirmed(&self) -> bool {
        self.entitlement.is_some()
    }
}

//--------------------------------------      AckOutcome      ---------------------------------------------------------
/// Acknowledging an event is idempotent. A repeat ack reports `AlreadyProcessed` and keeps the
/// original processing timestamp.
#[derive(Debug, Clone)]
pub enum AckOutcome {
    Acked(OutboxEvent),
    AlreadyProcessed(OutboxEvent),
}

impl AckOutcome {
    pub fn event(&self) -> &OutboxEvent {
        match self {
            AckOutcome::Acked(event) | AckOutcome::AlreadyProcessed(event) => event,
        }
    }

    pub fn was_first_ack(&self) -> bool {
        matches!(self, AckOutcome::Acked(_))
    }
}

//--------------------------------------    LinkedIdentity    ---------------------------------------------------------
/// The result of consuming a linking session: the spent session, the entitlement record now
/// carrying the binding, and the queued `STEAM_LINKED` notification.
#[derive(Debug, Clone)]
pub struct LinkedIdentity {
    pub session: LinkSession,
    pub entitlement: Entitlement,
    pub event: OutboxEvent,
}

//--------------------------------------      SweepResult     ---------------------------------------------------------
/// The aggregate result of an expiry sweep across the server registry. A failing server does not
/// stop the sweep; its error is recorded here instead.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    pub demoted: Vec<DemotedVip>,
    pub failures: Vec<(ServerId, String)>,
}

impl SweepResult {
    pub fn demoted_count(&self) -> usize {
        self.demoted.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
