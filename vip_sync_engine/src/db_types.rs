use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;
use vss_common::Price;

/// The entitlement term granted per confirmed order, and the default term for a direct grant.
pub const VIP_TERM_DAYS: i64 = 30;

pub fn vip_term() -> Duration {
    Duration::days(VIP_TERM_DAYS)
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------      ServerId        ---------------------------------------------------------
/// A lowercase identifier for one of the game servers the gateway manages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: AsRef<str>> From<S> for ServerId {
    fn from(value: S) -> Self {
        Self::new(value)
    }
}

impl Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   ServerRegistry     ---------------------------------------------------------
/// The closed set of servers this deployment manages. Loaded once at startup and injected into
/// the APIs, so every entry point validates against the same list.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Vec<ServerId>,
}

impl ServerRegistry {
    pub fn new(servers: Vec<ServerId>) -> Self {
        let mut registry = Self::default();
        for server in servers {
            if !registry.servers.contains(&server) {
                registry.servers.push(server);
            }
        }
        registry
    }

    /// Builds a registry from a comma-separated list, e.g. `server1,server2`. Blank entries are
    /// dropped and identifiers are normalised to lowercase.
    pub fn from_csv(csv: &str) -> Self {
        let servers = csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(ServerId::new).collect();
        Self::new(servers)
    }

    pub fn contains(&self, id: &ServerId) -> bool {
        self.servers.contains(id)
    }

    pub fn servers(&self) -> &[ServerId] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl Display for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids = self.servers.iter().map(ServerId::as_str).collect::<Vec<_>>().join(", ");
        write!(f, "[{ids}]")
    }
}

//--------------------------------------      DiscordId       ---------------------------------------------------------
/// A lightweight wrapper around a Discord member snowflake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct DiscordId(pub String);

impl DiscordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Into<String>> From<S> for DiscordId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for DiscordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       SteamId        ---------------------------------------------------------
/// A lightweight wrapper around a SteamID64.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct SteamId(pub String);

impl SteamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Into<String>> From<S> for SteamId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for SteamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       VipTier        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum VipTier {
    #[serde(rename = "vip")]
    #[sqlx(rename = "vip")]
    Vip,
    #[serde(rename = "vip+")]
    #[sqlx(rename = "vip+")]
    VipPlus,
}

impl Display for VipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VipTier::Vip => write!(f, "vip"),
            VipTier::VipPlus => write!(f, "vip+"),
        }
    }
}

impl FromStr for VipTier {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vip" => Ok(Self::Vip),
            "vip+" => Ok(Self::VipPlus),
            s => Err(ConversionError(format!("Invalid VIP tier: {s}"))),
        }
    }
}

//--------------------------------------    PaymentStatus     ---------------------------------------------------------
/// The normalised payment status of an order. Webhook payloads carry free-text statuses, so
/// anything outside the known set collapses to `Other` rather than failing the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Paid,
    Confirmed,
    Other,
}

impl PaymentStatus {
    /// The statuses that count as a completed payment and trigger the entitlement extension.
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentStatus::Approved | PaymentStatus::Paid | PaymentStatus::Confirmed)
    }

    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            "paid" => Self::Paid,
            "confirmed" => Self::Confirmed,
            _ => Self::Other,
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Approved => write!(f, "approved"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Confirmed => write!(f, "confirmed"),
            PaymentStatus::Other => write!(f, "other"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::normalize(s))
    }
}

//--------------------------------------       OrderId        ---------------------------------------------------------
/// The order NSU. Assigned at checkout and used as the idempotency key of the webhook flow.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------       EventId        ---------------------------------------------------------
/// The public identifier of an outbox event, presented to the bot for acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------      SessionId       ---------------------------------------------------------
/// The public identifier of a linking session, carried through the identity provider round trip.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     Entitlement      ---------------------------------------------------------
/// A per-server player record. Records are never deleted; lapsing or removal clears the tier and
/// expiry fields and the row stays behind with its identity bindings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub id: i64,
    pub server_id: ServerId,
    pub discord_id: Option<DiscordId>,
    pub steam_id: Option<SteamId>,
    #[serde(rename = "vipType")]
    pub vip_tier: Option<VipTier>,
    pub vip_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entitlement {
    /// VIP standing is always computed at read time and never stored.
    pub fn has_vip(&self, now: DateTime<Utc>) -> bool {
        match (self.vip_tier, self.vip_expires_at) {
            (Some(_), Some(expiry)) => expiry > now,
            _ => false,
        }
    }
}

//--------------------------------------  EntitlementUpdate   ---------------------------------------------------------
/// A patch for the entitlement upsert. Present fields win; absent fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct EntitlementUpdate {
    pub discord_id: Option<DiscordId>,
    pub steam_id: Option<SteamId>,
    pub vip: Option<VipGrant>,
}

impl EntitlementUpdate {
    pub fn link(discord_id: DiscordId, steam_id: SteamId) -> Self {
        Self { discord_id: Some(discord_id), steam_id: Some(steam_id), vip: None }
    }

    pub fn grant_for_steam(steam_id: SteamId, tier: VipTier, expires_at: DateTime<Utc>) -> Self {
        Self { discord_id: None, steam_id: Some(steam_id), vip: Some(VipGrant { tier, expires_at }) }
    }

    pub fn is_empty(&self) -> bool {
        self.discord_id.is_none() && self.steam_id.is_none() && self.vip.is_none()
    }
}

/// A tier and expiry pair, always set together.
#[derive(Debug, Clone, Copy)]
pub struct VipGrant {
    pub tier: VipTier,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------   EntitlementKey     ---------------------------------------------------------
/// Lookup key for a player record on a given server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementKey {
    Discord(DiscordId),
    Steam(SteamId),
}

impl Display for EntitlementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntitlementKey::Discord(id) => write!(f, "discord:{id}"),
            EntitlementKey::Steam(id) => write!(f, "steam:{id}"),
        }
    }
}

//--------------------------------------      VipStatus       ---------------------------------------------------------
/// The read model served to game plugins. Tier and expiry are only surfaced while the grant is
/// actually valid; a lapsed or unknown player reads as a plain non-VIP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipStatus {
    pub has_vip: bool,
    #[serde(rename = "vipType")]
    pub vip_tier: Option<VipTier>,
    pub vip_expires_at: Option<DateTime<Utc>>,
    pub discord_id: Option<DiscordId>,
}

impl VipStatus {
    pub fn none() -> Self {
        Self { has_vip: false, vip_tier: None, vip_expires_at: None, discord_id: None }
    }

    pub fn from_entitlement(entitlement: &Entitlement, now: DateTime<Utc>) -> Self {
        let has_vip = entitlement.has_vip(now);
        Self {
            has_vip,
            vip_tier: if has_vip { entitlement.vip_tier } else { None },
            vip_expires_at: if has_vip { entitlement.vip_expires_at } else { None },
            discord_id: entitlement.discord_id.clone(),
        }
    }
}

//--------------------------------------        Order         ---------------------------------------------------------
/// A row in the order ledger. The ledger is append-mostly; only the payment status, transaction
/// id and `updated_at` change after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    /// The transaction NSU reported by the payment provider. `None` until a webhook records it.
    pub transaction_id: Option<String>,
    pub discord_id: DiscordId,
    pub server_id: ServerId,
    pub vip_tier: VipTier,
    pub amount: Price,
    pub status: PaymentStatus,
    pub checkout_url: String,
    /// Caller-supplied retry token. Unique when present, so checkout retries reuse the stored
    /// order instead of minting a new one.
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub discord_id: DiscordId,
    pub server_id: ServerId,
    pub vip_tier: VipTier,
    pub amount: Price,
    pub checkout_url: String,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(
        order_id: OrderId,
        discord_id: DiscordId,
        server_id: ServerId,
        vip_tier: VipTier,
        amount: Price,
        checkout_url: String,
    ) -> Self {
        Self {
            order_id,
            discord_id,
            server_id,
            vip_tier,
            amount,
            checkout_url,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_idempotency_key<S: Into<String>>(mut self, key: S) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

//--------------------------------------      EventType       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum EventType {
    #[serde(rename = "STEAM_LINKED")]
    #[sqlx(rename = "STEAM_LINKED")]
    SteamLinked,
    #[serde(rename = "PAYMENT_CONFIRMED")]
    #[sqlx(rename = "PAYMENT_CONFIRMED")]
    PaymentConfirmed,
    #[serde(rename = "VIP_EXPIRED")]
    #[sqlx(rename = "VIP_EXPIRED")]
    VipExpired,
}

impl Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::SteamLinked => write!(f, "STEAM_LINKED"),
            EventType::PaymentConfirmed => write!(f, "PAYMENT_CONFIRMED"),
            EventType::VipExpired => write!(f, "VIP_EXPIRED"),
        }
    }
}

impl FromStr for EventType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STEAM_LINKED" => Ok(Self::SteamLinked),
            "PAYMENT_CONFIRMED" => Ok(Self::PaymentConfirmed),
            "VIP_EXPIRED" => Ok(Self::VipExpired),
            s => Err(ConversionError(format!("Invalid event type: {s}"))),
        }
    }
}

//--------------------------------------     OutboxEvent      ---------------------------------------------------------
/// A notification queued for the Discord bot. Append-only apart from the processed flag, and
/// delivered at least once; consumers must treat re-delivery as routine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    #[serde(skip)]
    pub id: i64,
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub discord_id: DiscordId,
    pub server_id: ServerId,
    #[serde(rename = "vipType")]
    pub vip_tier: Option<VipTier>,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

//--------------------------------------     LinkSession      ---------------------------------------------------------
/// A single-use session correlating a Discord member with the Steam identity they are about to
/// prove. Consumption is a compare-and-swap, so concurrent callbacks cannot both succeed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LinkSession {
    pub id: i64,
    pub session_id: SessionId,
    pub discord_id: DiscordId,
    pub server_id: ServerId,
    pub steam_id: Option<SteamId>,
    pub created_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}
