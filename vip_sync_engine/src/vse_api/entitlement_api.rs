//! Unified API for the per-server entitlement store.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        vip_term,
        DiscordId,
        Entitlement,
        EntitlementKey,
        EntitlementUpdate,
        ServerId,
        ServerRegistry,
        SteamId,
        VipStatus,
        VipTier,
    },
    traits::{EntitlementApiError, EntitlementManagement},
};

/// The `EntitlementApi` serves the game-server plugins: VIP status lookups and the manual grant and revoke
/// operations an admin can trigger from in-game.
pub struct EntitlementApi<B> {
    db: B,
    registry: ServerRegistry,
}

impl<B> Debug for EntitlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntitlementApi")
    }
}

impl<B> EntitlementApi<B> {
    pub fn new(db: B, registry: ServerRegistry) -> Self {
        Self { db, registry }
    }

    pub fn ensure_known_server(&self, server_id: &ServerId) -> Result<(), EntitlementApiError> {
        if self.registry.contains(server_id) {
            Ok(())
        } else {
            Err(EntitlementApiError::UnsupportedServer(server_id.clone()))
        }
    }
}

impl<B> EntitlementApi<B>
where B: EntitlementManagement
{
    /// The current VIP standing for a steam id. An unknown player reads as a plain non-VIP.
    pub async fn vip_status(&self, server_id: &ServerId, steam_id: &SteamId) -> Result<VipStatus, EntitlementApiError> {
        self.ensure_known_server(server_id)?;
        self.db.vip_status(server_id, steam_id, Utc::now()).await
    }

    /// Grants (or overwrites) a VIP tier for the given steam id. When no expiry is supplied the grant runs for one
    /// standard VIP term from now. A discord id can be supplied to bind that identity in the same write.
    pub async fn apply_vip(
        &self,
        server_id: &ServerId,
        steam_id: &SteamId,
        discord_id: Option<DiscordId>,
        tier: VipTier,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Entitlement, EntitlementApiError> {
        self.ensure_known_server(server_id)?;
        let expires_at = expires_at.unwrap_or_else(|| Utc::now() + vip_term());
        let mut update = EntitlementUpdate::grant_for_steam(steam_id.clone(), tier, expires_at);
        update.discord_id = discord_id;
        let entitlement = self.db.upsert_entitlement(server_id, update).await?;
        info!("🎟️ {tier} granted to steam id {steam_id} on {server_id}, running to {expires_at}");
        Ok(entitlement)
    }

    /// Revokes the VIP grant for the given steam id. The player record stays behind with its identity bindings.
    pub async fn remove_vip(&self, server_id: &ServerId, steam_id: &SteamId) -> Result<Entitlement, EntitlementApiError> {
        self.ensure_known_server(server_id)?;
        let entitlement = self.db.clear_vip(server_id, steam_id).await?;
        info!("🎟️ VIP revoked for steam id {steam_id} on {server_id}");
        Ok(entitlement)
    }

    pub async fn entitlement(
        &self,
        server_id: &ServerId,
        key: &EntitlementKey,
    ) -> Result<Option<Entitlement>, EntitlementApiError> {
        self.ensure_known_server(server_id)?;
        self.db.fetch_entitlement(server_id, key).await
    }

    pub async fn entitlements_for_server(&self, server_id: &ServerId) -> Result<Vec<Entitlement>, EntitlementApiError> {
        self.ensure_known_server(server_id)?;
        self.db.fetch_entitlements_for_server(server_id).await
    }
}
