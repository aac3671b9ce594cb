//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use std::str::FromStr;

use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use serde_json::json;
use vip_sync_engine::{
    db_types::{DiscordId, EventId, ServerId, SteamId, VipTier},
    traits::{EntitlementManagement, OutboxManagement},
    EntitlementApi,
    OutboxApi,
};

use crate::{
    data_objects::{ApplyVipRequest, InteractionRequest, JsonResponse, RemoveVipRequest, VipStatusQuery},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------    Bot    ----------------------------------------------------

route!(bot_events => Get "/events" impl OutboxManagement);
/// Route handler for the bot's notification poll.
///
/// Returns every pending outbox event, oldest first. Events stay pending until the bot
/// acknowledges them, so a poll after a crashed delivery sees the same events again.
pub async fn bot_events<B: OutboxManagement>(api: web::Data<OutboxApi<B>>) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET pending bot events");
    let events = api.pending_events().await?;
    debug!("💻️ Returning {} pending event(s) to the bot", events.len());
    Ok(HttpResponse::Ok().json(json!({ "events": events })))
}

route!(ack_event => Post "/events/{event_id}/ack" impl OutboxManagement);
/// Route handler for event acknowledgements.
///
/// Acknowledgement is idempotent. Acking an already-processed event succeeds and leaves the
/// original processing timestamp untouched; an unknown event id is a 404.
pub async fn ack_event<B: OutboxManagement>(
    path: web::Path<String>,
    api: web::Data<OutboxApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let event_id = EventId::from(path.into_inner());
    trace!("💻️ POST ack for event {event_id}");
    let outcome = api.ack(&event_id).await?;
    let message = if outcome.was_first_ack() {
        format!("Event {event_id} acknowledged.")
    } else {
        format!("Event {event_id} was already acknowledged.")
    };
    Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
}

#[get("/ping")]
pub async fn bot_ping() -> impl Responder {
    trace!("💻️ Received bot ping");
    HttpResponse::Ok().json(json!({ "ok": true, "ts": Utc::now() }))
}

/// Route handler for bot command interactions.
///
/// The bot reports each slash command here. The handler validates the payload and echoes it back
/// with a receipt timestamp; nothing is stored.
#[post("/interactions")]
pub async fn bot_interactions(body: web::Json<InteractionRequest>) -> Result<HttpResponse, ServerError> {
    let interaction = body.into_inner();
    let missing = interaction.missing_fields();
    if !missing.is_empty() {
        debug!("💻️ Interaction report rejected. Missing fields: {}", missing.join(", "));
        return Err(ServerError::InvalidRequest(format!("Missing required fields: {}", missing.join(", "))));
    }
    debug!(
        "💻️ Interaction '{}' from {} on {}",
        interaction.command.as_deref().unwrap_or_default(),
        interaction.discord_id.as_deref().unwrap_or_default(),
        interaction.server_id.as_deref().unwrap_or_default()
    );
    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "interaction": {
            "discordId": interaction.discord_id,
            "serverId": interaction.server_id,
            "type": interaction.interaction_type,
            "command": interaction.command,
            "receivedAt": Utc::now(),
        }
    })))
}

// ----------------------------------------------   Plugin  ----------------------------------------------------

route!(vip_status => Get "/vip-status" impl EntitlementManagement);
/// Route handler for the plugin's VIP status poll.
///
/// The plugin calls this when a player connects. An unknown player is an ordinary non-VIP
/// response, not an error.
pub async fn vip_status<B: EntitlementManagement>(
    query: web::Query<VipStatusQuery>,
    api: web::Data<EntitlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = query.into_inner();
    let server_id = ServerId::new(&params.server_id);
    let steam_id = SteamId::from(require_field(&params.steam_id, "steamId")?);
    trace!("💻️ GET vip-status for {steam_id} on {server_id}");
    let status = api.vip_status(&server_id, &steam_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

route!(apply_vip => Post "/apply-vip" impl EntitlementManagement);
/// Route handler for manual VIP grants from a game-server admin.
pub async fn apply_vip<B: EntitlementManagement>(
    body: web::Json<ApplyVipRequest>,
    api: web::Data<EntitlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    let server_id = ServerId::new(&request.server_id);
    let steam_id = SteamId::from(require_field(&request.steam_id, "steamId")?);
    let tier = VipTier::from_str(&request.vip_type).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    let discord_id = request.discord_id.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(DiscordId::from);
    debug!("💻️ POST apply-vip: {tier} for {steam_id} on {server_id}");
    let entitlement = api.apply_vip(&server_id, &steam_id, discord_id, tier, request.vip_expires_at).await?;
    let expiry = entitlement.vip_expires_at.map(|t| t.to_rfc3339()).unwrap_or_default();
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{tier} granted to {steam_id} until {expiry}"))))
}

route!(remove_vip => Post "/remove-vip" impl EntitlementManagement);
/// Route handler for manual VIP revocations. The player record stays behind with its identity
/// bindings; only the grant is cleared.
pub async fn remove_vip<B: EntitlementManagement>(
    body: web::Json<RemoveVipRequest>,
    api: web::Data<EntitlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    let server_id = ServerId::new(&request.server_id);
    let steam_id = SteamId::from(require_field(&request.steam_id, "steamId")?);
    debug!("💻️ POST remove-vip for {steam_id} on {server_id}");
    api.remove_vip(&server_id, &steam_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("VIP removed from {steam_id} on {server_id}"))))
}

pub(crate) fn require_field(value: &str, name: &str) -> Result<String, ServerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ServerError::InvalidRequest(format!("{name} must not be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}
