use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use vip_sync_engine::{
    db_types::{DiscordId, Entitlement, ServerId, SteamId, VipTier},
    traits::EntitlementApiError,
    EntitlementApi,
};
use vss_common::Secret;

use crate::{
    endpoint_tests::{
        helpers::{get_request, post_request, test_registry},
        mocks::MockEntitlements,
    },
    middleware::ApiKeyMiddlewareFactory,
    routes::{ApplyVipRoute, RemoveVipRoute, VipStatusRoute},
};

const PLUGIN_TOKEN: &str = "plugin-token-456";
const STEAM_ID: &str = "76561198012345678";

fn entitlement(tier: Option<VipTier>, expires_at: Option<chrono::DateTime<Utc>>) -> Entitlement {
    let now = Utc::now();
    Entitlement {
        id: 7,
        server_id: ServerId::new("server1"),
        discord_id: Some(DiscordId::from("99887766")),
        steam_id: Some(SteamId::from(STEAM_ID)),
        vip_tier: tier,
        vip_expires_at: expires_at,
        created_at: now - Duration::days(90),
        updated_at: now,
    }
}

fn register(cfg: &mut ServiceConfig, db: MockEntitlements) {
    let api = EntitlementApi::new(db, test_registry());
    cfg.service(
        web::scope("/plugin")
            .wrap(ApiKeyMiddlewareFactory::required("x-api-token", Secret::new(PLUGIN_TOKEN.to_string()), false))
            .service(VipStatusRoute::<MockEntitlements>::new())
            .service(ApplyVipRoute::<MockEntitlements>::new())
            .service(RemoveVipRoute::<MockEntitlements>::new()),
    )
    .app_data(web::Data::new(api));
}

fn configure_active_vip(cfg: &mut ServiceConfig) {
    let mut db = MockEntitlements::new();
    db.expect_fetch_entitlement()
        .returning(|_, _| Ok(Some(entitlement(Some(VipTier::VipPlus), Some(Utc::now() + Duration::days(12))))));
    register(cfg, db);
}

fn configure_unknown_player(cfg: &mut ServiceConfig) {
    let mut db = MockEntitlements::new();
    db.expect_fetch_entitlement().returning(|_, _| Ok(None));
    register(cfg, db);
}

fn configure_lapsed_vip(cfg: &mut ServiceConfig) {
    let mut db = MockEntitlements::new();
    db.expect_fetch_entitlement()
        .returning(|_, _| Ok(Some(entitlement(Some(VipTier::Vip), Some(Utc::now() - Duration::days(3))))));
    register(cfg, db);
}

fn configure_grant(cfg: &mut ServiceConfig) {
    let mut db = MockEntitlements::new();
    db.expect_upsert_entitlement()
        .withf(|_, update| {
            update.vip.map(|grant| grant.tier) == Some(VipTier::VipPlus)
                && update.steam_id.as_ref().map(|id| id.as_str()) == Some(STEAM_ID)
        })
        .returning(|_, update| {
            let grant = update.vip.unwrap();
            Ok(entitlement(Some(grant.tier), Some(grant.expires_at)))
        });
    register(cfg, db);
}

fn configure_revoke(cfg: &mut ServiceConfig) {
    let mut db = MockEntitlements::new();
    db.expect_clear_vip().returning(|_, _| Ok(entitlement(None, None)));
    register(cfg, db);
}

fn configure_player_missing(cfg: &mut ServiceConfig) {
    let mut db = MockEntitlements::new();
    db.expect_clear_vip().returning(|_, steam_id| Err(EntitlementApiError::PlayerNotFound(steam_id.clone())));
    register(cfg, db);
}

fn configure_untouched_backend(cfg: &mut ServiceConfig) {
    let mut db = MockEntitlements::new();
    db.expect_fetch_entitlement().times(0);
    db.expect_upsert_entitlement().times(0);
    db.expect_clear_vip().times(0);
    register(cfg, db);
}

fn plugin_headers() -> [(&'static str, &'static str); 1] {
    [("x-api-token", PLUGIN_TOKEN)]
}

#[actix_web::test]
async fn the_plugin_scope_requires_a_token() {
    let _ = env_logger::try_init();
    let path = format!("/plugin/vip-status?serverId=server1&steamId={STEAM_ID}");
    let err = get_request(&[], &path, configure_untouched_backend).await.expect_err("Expected error");
    assert!(err.contains("No API key presented"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn vip_status_reports_an_active_grant() {
    let _ = env_logger::try_init();
    let path = format!("/plugin/vip-status?serverId=server1&steamId={STEAM_ID}");
    let (status, body) = get_request(&plugin_headers(), &path, configure_active_vip).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["hasVip"], true);
    assert_eq!(response["vipType"], "vip+");
    assert_eq!(response["discordId"], "99887766");
    assert!(response["vipExpiresAt"].is_string(), "Expected an expiry, got: {body}");
}

#[actix_web::test]
async fn an_unknown_player_is_a_plain_non_vip() {
    let _ = env_logger::try_init();
    let path = format!("/plugin/vip-status?serverId=server1&steamId={STEAM_ID}");
    let (status, body) = get_request(&plugin_headers(), &path, configure_unknown_player).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["hasVip"], false);
    assert!(response["vipType"].is_null(), "Expected no tier, got: {body}");
}

#[actix_web::test]
async fn a_lapsed_grant_reads_as_non_vip() {
    let _ = env_logger::try_init();
    let path = format!("/plugin/vip-status?serverId=server1&steamId={STEAM_ID}");
    let (status, body) = get_request(&plugin_headers(), &path, configure_lapsed_vip).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["hasVip"], false);
    assert!(response["vipType"].is_null(), "A lapsed tier must not be surfaced: {body}");
    // The identity binding is still reported so the plugin can show who the player is.
    assert_eq!(response["discordId"], "99887766");
}

#[actix_web::test]
async fn vip_status_rejects_unknown_servers() {
    let _ = env_logger::try_init();
    let path = format!("/plugin/vip-status?serverId=atlantis&steamId={STEAM_ID}");
    let err = get_request(&plugin_headers(), &path, configure_untouched_backend).await.expect_err("Expected error");
    assert!(err.contains("Server atlantis is not in the registry"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn vip_status_requires_a_steam_id() {
    let _ = env_logger::try_init();
    let err = get_request(&plugin_headers(), "/plugin/vip-status?serverId=server1&steamId=", configure_untouched_backend)
        .await
        .expect_err("Expected error");
    assert!(err.contains("steamId must not be empty"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn apply_vip_grants_a_tier() {
    let _ = env_logger::try_init();
    let body = json!({"serverId": "server1", "steamId": STEAM_ID, "vipType": "vip+"});
    let (status, body) =
        post_request(&plugin_headers(), "/plugin/apply-vip", body, configure_grant).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["success"], true);
    let message = response["message"].as_str().unwrap_or_default();
    assert!(message.contains("vip+ granted to"), "Unexpected message: {message}");
}

#[actix_web::test]
async fn apply_vip_rejects_unknown_tiers() {
    let _ = env_logger::try_init();
    let body = json!({"serverId": "server1", "steamId": STEAM_ID, "vipType": "gold"});
    let err = post_request(&plugin_headers(), "/plugin/apply-vip", body, configure_untouched_backend)
        .await
        .expect_err("Expected error");
    assert!(err.contains("Invalid VIP tier: gold"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn remove_vip_clears_the_grant() {
    let _ = env_logger::try_init();
    let body = json!({"serverId": "server1", "steamId": STEAM_ID});
    let (status, body) =
        post_request(&plugin_headers(), "/plugin/remove-vip", body, configure_revoke).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["success"], true);
    assert!(response["message"].as_str().unwrap_or_default().contains("VIP removed from"), "Unexpected body: {body}");
}

#[actix_web::test]
async fn removing_vip_from_an_unknown_player_is_not_found() {
    let _ = env_logger::try_init();
    let body = json!({"serverId": "server1", "steamId": STEAM_ID});
    let err = post_request(&plugin_headers(), "/plugin/remove-vip", body, configure_player_missing)
        .await
        .expect_err("Expected error");
    assert!(err.contains("The data was not found"), "Unexpected error: {err}");
    assert!(err.contains("No entitlement record for steam id"), "Unexpected error: {err}");
}
