use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{DiscordId, Entitlement, EntitlementKey, EntitlementUpdate, ServerId, SteamId, VipTier},
    sqlite::db::is_unique_violation,
    traits::EntitlementApiError,
};

/// Patches the oldest record matching the update's identity, or inserts a fresh record when
/// nothing matches. Identity collisions with another record surface as `DuplicateIdentity`.
pub async fn upsert(
    server_id: &ServerId,
    update: EntitlementUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Entitlement, EntitlementApiError> {
    if update.is_empty() {
        return Err(EntitlementApiError::EmptyUpdate);
    }
    let existing = fetch_match(server_id, &update, &mut *conn).await?;
    let result = match existing {
        Some(current) => patch(current.id, &update, now, conn).await,
        None => insert(server_id, &update, now, conn).await,
    };
    result.map_err(|e| {
        if is_unique_violation(&e) {
            EntitlementApiError::DuplicateIdentity(server_id.clone())
        } else {
            e.into()
        }
    })
}

/// Returns the oldest record matching the patch's discord id or, when one is supplied, its steam
/// id. First match wins, oldest row preferred.
async fn fetch_match(
    server_id: &ServerId,
    update: &EntitlementUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Entitlement>, sqlx::Error> {
    let row = sqlx::query_as(
        r#"
        SELECT * FROM entitlements
        WHERE server_id = $1
          AND (($2 IS NOT NULL AND discord_id = $2) OR ($3 IS NOT NULL AND steam_id = $3))
        ORDER BY id LIMIT 1"#,
    )
    .bind(server_id.clone())
    .bind(update.discord_id.clone())
    .bind(update.steam_id.clone())
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

async fn patch(
    id: i64,
    update: &EntitlementUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Entitlement, sqlx::Error> {
    let mut builder = QueryBuilder::new("UPDATE entitlements SET updated_at = ");
    builder.push_bind(now);
    if let Some(discord_id) = &update.discord_id {
        builder.push(", discord_id = ");
        builder.push_bind(discord_id.clone());
    }
    if let Some(steam_id) = &update.steam_id {
        builder.push(", steam_id = ");
        builder.push_bind(steam_id.clone());
    }
    if let Some(grant) = &update.vip {
        builder.push(", vip_tier = ");
        builder.push_bind(grant.tier);
        builder.push(", vip_expires_at = ");
        builder.push_bind(grant.expires_at);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let row = builder.build_query_as::<Entitlement>().fetch_one(conn).await?;
    Ok(row)
}

async fn insert(
    server_id: &ServerId,
    update: &EntitlementUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Entitlement, sqlx::Error> {
    let (tier, expires_at) = match &update.vip {
        Some(grant) => (Some(grant.tier), Some(grant.expires_at)),
        None => (None, None),
    };
    let row: Entitlement = sqlx::query_as(
        r#"
            INSERT INTO entitlements (
                server_id,
                discord_id,
                steam_id,
                vip_tier,
                vip_expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(server_id.clone())
    .bind(update.discord_id.clone())
    .bind(update.steam_id.clone())
    .bind(tier)
    .bind(expires_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("📝️ New entitlement record {} created on {server_id}", row.id);
    Ok(row)
}

/// Returns the oldest record for the given lookup key.
pub async fn fetch_entitlement(
    server_id: &ServerId,
    key: &EntitlementKey,
    conn: &mut SqliteConnection,
) -> Result<Option<Entitlement>, sqlx::Error> {
    let (column, value) = match key {
        EntitlementKey::Discord(id) => ("discord_id", id.as_str().to_string()),
        EntitlementKey::Steam(id) => ("steam_id", id.as_str().to_string()),
    };
    let query = format!("SELECT * FROM entitlements WHERE server_id = $1 AND {column} = $2 ORDER BY id LIMIT 1");
    let row = sqlx::query_as(&query).bind(server_id.clone()).bind(value).fetch_optional(conn).await?;
    Ok(row)
}

pub async fn fetch_all_for_server(
    server_id: &ServerId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Entitlement>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM entitlements WHERE server_id = $1 ORDER BY id")
        .bind(server_id.clone())
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

/// Extends the member's grant by `term` on top of any remaining time. A grant that has already
/// lapsed (or never existed) extends from `now`, never from the stale expiry.
pub async fn extend_vip(
    server_id: &ServerId,
    discord_id: &DiscordId,
    tier: VipTier,
    term: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Entitlement, EntitlementApiError> {
    let existing: Option<Entitlement> =
        sqlx::query_as("SELECT * FROM entitlements WHERE server_id = $1 AND discord_id = $2 ORDER BY id LIMIT 1")
            .bind(server_id.clone())
            .bind(discord_id.clone())
            .fetch_optional(&mut *conn)
            .await?;
    let base = existing.as_ref().and_then(|e| e.vip_expires_at).filter(|expiry| *expiry > now).unwrap_or(now);
    let expires_at = base + term;
    let result = match existing {
        Some(current) => {
            sqlx::query_as(
                "UPDATE entitlements SET vip_tier = $2, vip_expires_at = $3, updated_at = $4 WHERE id = $1 \
                 RETURNING *",
            )
            .bind(current.id)
            .bind(tier)
            .bind(expires_at)
            .bind(now)
            .fetch_one(conn)
            .await
        },
        None => {
            let update = EntitlementUpdate {
                discord_id: Some(discord_id.clone()),
                steam_id: None,
                vip: Some(crate::db_types::VipGrant { tier, expires_at }),
            };
            insert(server_id, &update, now, conn).await
        },
    };
    let entitlement = result.map_err(|e| {
        if is_unique_violation(&e) {
            EntitlementApiError::DuplicateIdentity(server_id.clone())
        } else {
            EntitlementApiError::from(e)
        }
    })?;
    debug!("📝️ VIP grant for {discord_id} on {server_id} now runs to {expires_at}");
    Ok(entitlement)
}

/// Clears the grant on the oldest record bound to the steam id. `None` when the player is
/// unknown on this server.
pub async fn clear_vip(
    server_id: &ServerId,
    steam_id: &SteamId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Entitlement>, sqlx::Error> {
    let row = sqlx::query_as(
        r#"
        UPDATE entitlements SET vip_tier = NULL, vip_expires_at = NULL, updated_at = $3
        WHERE id = (SELECT id FROM entitlements WHERE server_id = $1 AND steam_id = $2 ORDER BY id LIMIT 1)
        RETURNING *"#,
    )
    .bind(server_id.clone())
    .bind(steam_id.clone())
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// All records on the server whose grant has lapsed at `now`.
pub async fn fetch_lapsed(
    server_id: &ServerId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Entitlement>, sqlx::Error> {
    let rows = sqlx::query_as(
        r#"
        SELECT * FROM entitlements
        WHERE server_id = $1
          AND vip_tier IS NOT NULL
          AND vip_expires_at IS NOT NULL
          AND unixepoch(vip_expires_at) <= unixepoch($2)
        ORDER BY id"#,
    )
    .bind(server_id.clone())
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub(crate) async fn demote(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Entitlement, sqlx::Error> {
    let row = sqlx::query_as(
        "UPDATE entitlements SET vip_tier = NULL, vip_expires_at = NULL, updated_at = $2 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(row)
}
