//----------------------------------------------   Linking  ----------------------------------------------------

use actix_web::{http::header::ContentType, web, HttpRequest, HttpResponse};
use log::*;
use serde_json::{json, Value};
use vip_sync_engine::{
    db_types::{DiscordId, ServerId, SessionId},
    traits::VipGatewayDatabase,
    LinkingApi,
};

use crate::{
    config::ServerOptions,
    data_objects::{LinkRequest, SteamCallbackParams},
    errors::ServerError,
    route,
    routes::require_field,
    steam_openid::IdentityVerifier,
};

/// The page shown in the player's browser once their Steam account is linked. The audience is
/// Brazilian, hence the Portuguese.
const LINKED_PAGE: &str = "Steam vinculada com sucesso. Você já pode voltar ao Discord.";

route!(steam_link => Post "/steam/link" impl VipGatewayDatabase, IdentityVerifier);
/// Route handler for starting a Steam linking session.
///
/// Opens a single-use session for the Discord member and returns the Steam login URL the bot
/// should send them to. The session id travels through Steam in the return URL and comes back on
/// the callback.
pub async fn steam_link<B, V>(
    body: web::Json<LinkRequest>,
    api: web::Data<LinkingApi<B>>,
    verifier: web::Data<V>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: VipGatewayDatabase,
    V: IdentityVerifier,
{
    let response = handle_link(body.into_inner(), &api, verifier.get_ref(), &options).await?;
    Ok(HttpResponse::Ok().json(response))
}

route!(steam_link_form => Get "/steam/link" impl VipGatewayDatabase, IdentityVerifier);
/// GET variant of [`steam_link`], with the request carried in the query string.
pub async fn steam_link_form<B, V>(
    query: web::Query<LinkRequest>,
    api: web::Data<LinkingApi<B>>,
    verifier: web::Data<V>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: VipGatewayDatabase,
    V: IdentityVerifier,
{
    let response = handle_link(query.into_inner(), &api, verifier.get_ref(), &options).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn handle_link<B, V>(
    request: LinkRequest,
    api: &LinkingApi<B>,
    verifier: &V,
    options: &ServerOptions,
) -> Result<Value, ServerError>
where
    B: VipGatewayDatabase,
    V: IdentityVerifier,
{
    let server_id = ServerId::new(&request.server_id);
    let discord_id = DiscordId::from(require_field(&request.discord_id, "discordId")?);
    let session = api.start_session(&discord_id, &server_id).await?;
    let return_to = options.steam_return_url(session.session_id.as_str());
    let url = verifier.login_url(&return_to)?;
    debug!("🔗️ Sending {discord_id} to Steam for session {}", session.session_id);
    Ok(json!({ "steamAuthUrl": url }))
}

route!(steam_callback => Get "/steam/callback" impl VipGatewayDatabase, IdentityVerifier);
/// Route handler for the Steam OpenID callback.
///
/// The assertion in the query string is verified with Steam first; only then is the session
/// consumed. A session can be consumed exactly once, so a replayed callback fails even with a
/// valid assertion.
pub async fn steam_callback<B, V>(
    req: HttpRequest,
    query: web::Query<SteamCallbackParams>,
    api: web::Data<LinkingApi<B>>,
    verifier: web::Data<V>,
) -> Result<HttpResponse, ServerError>
where
    B: VipGatewayDatabase,
    V: IdentityVerifier,
{
    let session_id = SessionId::from(query.into_inner().session_id);
    trace!("🔗️ Steam callback for session {session_id}");
    let steam_id = verifier.verify(req.query_string()).await?;
    let linked = api.complete_session(&session_id, &steam_id).await?;
    info!("🔗️ Steam account {steam_id} linked to {} on {}", linked.session.discord_id, linked.session.server_id);
    Ok(HttpResponse::Ok().content_type(ContentType::plaintext()).body(LINKED_PAGE))
}
