use chrono::{DateTime, Duration, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{DiscordId, LinkSession, ServerId, SessionId, SteamId},
    traits::VipGatewayError,
};

pub async fn insert_session(
    discord_id: &DiscordId,
    server_id: &ServerId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<LinkSession, sqlx::Error> {
    let row: LinkSession = sqlx::query_as(
        r#"
            INSERT INTO link_sessions (session_id, discord_id, server_id, created_at, used)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING *;
        "#,
    )
    .bind(SessionId::random())
    .bind(discord_id.clone())
    .bind(server_id.clone())
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Link session {} opened for {} on {}", row.session_id, row.discord_id, row.server_id);
    Ok(row)
}

/// Marks the session used and records the proven steam id, in one compare-and-swap. When the
/// swap misses, the follow-up read tells the caller whether the session was unknown, already
/// spent, or past its time-to-live.
pub async fn consume_session(
    session_id: &SessionId,
    steam_id: &SteamId,
    ttl: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<LinkSession, VipGatewayError> {
    let cutoff = now - ttl;
    let consumed: Option<LinkSession> = sqlx::query_as(
        r#"
        UPDATE link_sessions SET used = 1, used_at = $2, steam_id = $3
        WHERE session_id = $1 AND used = 0 AND unixepoch(created_at) > unixepoch($4)
        RETURNING *"#,
    )
    .bind(session_id.as_str())
    .bind(now)
    .bind(steam_id.clone())
    .bind(cutoff)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(session) = consumed {
        debug!("📝️ Link session {} consumed for steam id {}", session.session_id, steam_id);
        return Ok(session);
    }
    let existing: Option<LinkSession> = sqlx::query_as("SELECT * FROM link_sessions WHERE session_id = $1")
        .bind(session_id.as_str())
        .fetch_optional(conn)
        .await?;
    match existing {
        None => Err(VipGatewayError::SessionNotFound(session_id.clone())),
        Some(session) if session.used => Err(VipGatewayError::SessionAlreadyUsed(session_id.clone())),
        Some(_) => Err(VipGatewayError::SessionExpired(session_id.clone())),
    }
}

/// Deletes spent sessions and sessions past their time-to-live. Returns the number removed.
pub async fn prune_sessions(
    ttl: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let cutoff = now - ttl;
    let result = sqlx::query("DELETE FROM link_sessions WHERE used = 1 OR unixepoch(created_at) <= unixepoch($1)")
        .bind(cutoff)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
