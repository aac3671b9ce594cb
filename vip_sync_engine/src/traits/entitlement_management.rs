use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Entitlement, EntitlementKey, EntitlementUpdate, ServerId, SteamId, VipStatus};

#[derive(Debug, Clone, Error)]
pub enum EntitlementApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No entitlement record for steam id {0}")]
    PlayerNotFound(SteamId),
    #[error("Another record on server {0} already holds that identity")]
    DuplicateIdentity(ServerId),
    #[error("Server {0} is not in the registry")]
    UnsupportedServer(ServerId),
    #[error("The update patch is empty")]
    EmptyUpdate,
}

impl From<sqlx::Error> for EntitlementApiError {
    fn from(e: sqlx::Error) -> Self {
        EntitlementApiError::DatabaseError(e.to_string())
    }
}

/// The `EntitlementManagement` trait defines behaviour for the per-server player records.
///
/// Records carry identity bindings (Discord member, Steam account) and the current VIP grant.
/// They are never deleted; revocation and expiry clear the grant fields in place.
#[allow(async_fn_in_trait)]
pub trait EntitlementManagement {
    /// Patches the oldest record matching the update's discord id or, when one is supplied, its
    /// steam id. If no record matches, a new one is inserted. Identity collisions with another
    /// record surface as [`EntitlementApiError::DuplicateIdentity`].
    async fn upsert_entitlement(
        &self,
        server_id: &ServerId,
        update: EntitlementUpdate,
    ) -> Result<Entitlement, EntitlementApiError>;

    /// Fetches the oldest record matching the given key. If no record exists, `None` is returned.
    async fn fetch_entitlement(
        &self,
        server_id: &ServerId,
        key: &EntitlementKey,
    ) -> Result<Option<Entitlement>, EntitlementApiError>;

    async fn fetch_entitlements_for_server(&self, server_id: &ServerId) -> Result<Vec<Entitlement>, EntitlementApiError>;

    /// Clears the VIP grant for the record bound to the given steam id. The record itself stays.
    async fn clear_vip(&self, server_id: &ServerId, steam_id: &SteamId) -> Result<Entitlement, EntitlementApiError>;

    /// The computed standing for a steam id. An unknown player is a plain non-VIP, not an error.
    async fn vip_status(
        &self,
        server_id: &ServerId,
        steam_id: &SteamId,
        now: DateTime<Utc>,
    ) -> Result<VipStatus, EntitlementApiError> {
        let entitlement = self.fetch_entitlement(server_id, &EntitlementKey::Steam(steam_id.clone())).await?;
        Ok(entitlement.map(|e| VipStatus::from_entitlement(&e, now)).unwrap_or_else(VipStatus::none))
    }
}
