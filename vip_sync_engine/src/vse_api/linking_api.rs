//! Unified API for Discord to Steam account linking.

use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{DiscordId, LinkSession, ServerId, ServerRegistry, SessionId, SteamId},
    traits::{LinkedIdentity, VipGatewayDatabase, VipGatewayError},
};

/// The `LinkingApi` manages the single-use sessions that bind a Discord member to a Steam account.
///
/// A session is created when the member starts the flow from Discord and consumed exactly once when the identity
/// provider confirms the Steam login. Sessions expire after the configured TTL and a spent or stale session can
/// never be replayed.
pub struct LinkingApi<B> {
    db: B,
    registry: ServerRegistry,
    session_ttl: Duration,
}

impl<B> Debug for LinkingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LinkingApi (ttl {})", self.session_ttl)
    }
}

impl<B> LinkingApi<B> {
    pub fn new(db: B, registry: ServerRegistry, session_ttl: Duration) -> Self {
        Self { db, registry, session_ttl }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn ensure_known_server(&self, server_id: &ServerId) -> Result<(), VipGatewayError> {
        if self.registry.contains(server_id) {
            Ok(())
        } else {
            Err(VipGatewayError::UnsupportedServer(server_id.clone()))
        }
    }
}

impl<B> LinkingApi<B>
where B: VipGatewayDatabase
{
    /// Opens a new linking session for the given member and server.
    pub async fn start_session(
        &self,
        discord_id: &DiscordId,
        server_id: &ServerId,
    ) -> Result<LinkSession, VipGatewayError> {
        self.ensure_known_server(server_id)?;
        let session = self.db.create_link_session(discord_id, server_id).await?;
        debug!("🔗️ Link session {} opened for {discord_id} on {server_id}", session.session_id);
        Ok(session)
    }

    /// Consumes a session with the verified steam id, binding it to the member's entitlement record and queueing a
    /// `STEAM_LINKED` notification. Fails with a typed error when the session is unknown, already spent, or older
    /// than the TTL.
    pub async fn complete_session(
        &self,
        session_id: &SessionId,
        steam_id: &SteamId,
    ) -> Result<LinkedIdentity, VipGatewayError> {
        let linked = self.db.consume_link_session(session_id, steam_id, self.session_ttl, Utc::now()).await?;
        info!("🔗️ Steam id {steam_id} linked to {} on {}", linked.session.discord_id, linked.session.server_id);
        Ok(linked)
    }

    /// Removes spent sessions and sessions older than the TTL. Returns the number of rows removed.
    pub async fn prune(&self) -> Result<u64, VipGatewayError> {
        self.db.prune_link_sessions(self.session_ttl, Utc::now()).await
    }
}
