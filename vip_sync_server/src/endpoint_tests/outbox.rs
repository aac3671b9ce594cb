use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use vip_sync_engine::{
    db_types::{DiscordId, EventId, EventType, OutboxEvent, ServerId, VipTier},
    traits::{AckOutcome, OutboxApiError},
    OutboxApi,
};
use vss_common::Secret;

use crate::{
    endpoint_tests::{
        helpers::{get_request, post_request},
        mocks::MockOutbox,
    },
    middleware::ApiKeyMiddlewareFactory,
    routes::{bot_interactions, bot_ping, AckEventRoute, BotEventsRoute},
};

const BOT_KEY: &str = "bot-key-123";
const EVENT_ID: &str = "11111111-2222-3333-4444-555555555555";

fn event(event_id: &str, event_type: EventType) -> OutboxEvent {
    OutboxEvent {
        id: 1,
        event_id: EventId::from(event_id.to_string()),
        event_type,
        discord_id: DiscordId::from("99887766"),
        server_id: ServerId::new("server1"),
        vip_tier: Some(VipTier::Vip),
        created_at: Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap(),
        processed: false,
        processed_at: None,
    }
}

fn register(cfg: &mut ServiceConfig, outbox: MockOutbox, key: Secret<String>) {
    let api = OutboxApi::new(outbox);
    cfg.service(
        web::scope("/bot")
            .wrap(ApiKeyMiddlewareFactory::required("x-api-key", key, true))
            .service(BotEventsRoute::<MockOutbox>::new())
            .service(AckEventRoute::<MockOutbox>::new())
            .service(bot_ping)
            .service(bot_interactions),
    )
    .app_data(web::Data::new(api));
}

fn configure_two_events(cfg: &mut ServiceConfig) {
    let mut outbox = MockOutbox::new();
    outbox.expect_fetch_pending_events().returning(|| {
        Ok(vec![
            event(EVENT_ID, EventType::PaymentConfirmed),
            event("66666666-7777-8888-9999-000000000000", EventType::SteamLinked),
        ])
    });
    register(cfg, outbox, Secret::new(BOT_KEY.to_string()));
}

fn configure_empty_outbox(cfg: &mut ServiceConfig) {
    let mut outbox = MockOutbox::new();
    outbox.expect_fetch_pending_events().returning(|| Ok(vec![]));
    register(cfg, outbox, Secret::new(BOT_KEY.to_string()));
}

fn configure_first_ack(cfg: &mut ServiceConfig) {
    let mut outbox = MockOutbox::new();
    outbox.expect_ack_event().withf(|event_id, _now| event_id.as_str() == EVENT_ID).returning(|event_id, now| {
        let mut acked = event(event_id.as_str(), EventType::PaymentConfirmed);
        acked.processed = true;
        acked.processed_at = Some(now);
        Ok(AckOutcome::Acked(acked))
    });
    register(cfg, outbox, Secret::new(BOT_KEY.to_string()));
}

fn configure_repeat_ack(cfg: &mut ServiceConfig) {
    let mut outbox = MockOutbox::new();
    outbox.expect_ack_event().returning(|event_id, now| {
        let mut acked = event(event_id.as_str(), EventType::PaymentConfirmed);
        acked.processed = true;
        // The original timestamp survives a repeat ack.
        acked.processed_at = Some(now - Duration::minutes(10));
        Ok(AckOutcome::AlreadyProcessed(acked))
    });
    register(cfg, outbox, Secret::new(BOT_KEY.to_string()));
}

fn configure_unknown_event(cfg: &mut ServiceConfig) {
    let mut outbox = MockOutbox::new();
    outbox.expect_ack_event().returning(|event_id, _now| Err(OutboxApiError::EventNotFound(event_id.clone())));
    register(cfg, outbox, Secret::new(BOT_KEY.to_string()));
}

fn configure_untouched_backend(cfg: &mut ServiceConfig) {
    let mut outbox = MockOutbox::new();
    outbox.expect_fetch_pending_events().times(0);
    outbox.expect_ack_event().times(0);
    register(cfg, outbox, Secret::new(BOT_KEY.to_string()));
}

fn configure_no_key_on_server(cfg: &mut ServiceConfig) {
    let mut outbox = MockOutbox::new();
    outbox.expect_fetch_pending_events().times(0);
    register(cfg, outbox, Secret::default());
}

fn bot_headers() -> [(&'static str, &'static str); 1] {
    [("x-api-key", BOT_KEY)]
}

#[actix_web::test]
async fn the_bot_scope_requires_a_key() {
    let _ = env_logger::try_init();
    let err = get_request(&[], "/bot/events", configure_untouched_backend).await.expect_err("Expected error");
    assert!(err.contains("No API key presented"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn a_wrong_key_is_rejected() {
    let _ = env_logger::try_init();
    let err = get_request(&[("x-api-key", "nope")], "/bot/events", configure_untouched_backend)
        .await
        .expect_err("Expected error");
    assert!(err.contains("Invalid API key"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn an_unconfigured_key_denies_everything() {
    let _ = env_logger::try_init();
    let err = get_request(&bot_headers(), "/bot/events", configure_no_key_on_server).await.expect_err("Expected error");
    assert!(err.contains("No API key is configured on the server"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn pending_events_are_listed_for_the_bot() {
    let _ = env_logger::try_init();
    let (status, body) = get_request(&bot_headers(), "/bot/events", configure_two_events).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    let events = response["events"].as_array().expect("events missing");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["eventId"], EVENT_ID);
    assert_eq!(events[0]["type"], "PAYMENT_CONFIRMED");
    assert_eq!(events[0]["discordId"], "99887766");
    assert_eq!(events[0]["vipType"], "vip");
    assert_eq!(events[1]["type"], "STEAM_LINKED");
}

#[actix_web::test]
async fn the_same_key_works_as_a_bearer_token() {
    let _ = env_logger::try_init();
    let headers = [("Authorization", "Bearer bot-key-123")];
    let (status, _) = get_request(&headers, "/bot/events", configure_two_events).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn an_empty_outbox_is_an_empty_list() {
    let _ = env_logger::try_init();
    let (status, body) = get_request(&bot_headers(), "/bot/events", configure_empty_outbox).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["events"].as_array().map(Vec::len), Some(0));
}

#[actix_web::test]
async fn acking_an_event_marks_it_processed() {
    let _ = env_logger::try_init();
    let path = format!("/bot/events/{EVENT_ID}/ack");
    let (status, body) =
        post_request(&bot_headers(), &path, json!({}), configure_first_ack).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["success"], true);
    assert!(response["message"].as_str().unwrap_or_default().contains("acknowledged"), "Unexpected body: {body}");
}

#[actix_web::test]
async fn acking_twice_is_routine() {
    let _ = env_logger::try_init();
    let path = format!("/bot/events/{EVENT_ID}/ack");
    let (status, body) =
        post_request(&bot_headers(), &path, json!({}), configure_repeat_ack).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["success"], true);
    assert!(response["message"].as_str().unwrap_or_default().contains("already"), "Unexpected body: {body}");
}

#[actix_web::test]
async fn acking_an_unknown_event_is_not_found() {
    let _ = env_logger::try_init();
    let err = post_request(&bot_headers(), "/bot/events/no-such-event/ack", json!({}), configure_unknown_event)
        .await
        .expect_err("Expected error");
    assert!(err.contains("The data was not found"), "Unexpected error: {err}");
    assert!(err.contains("No event with id"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn ping_answers_with_a_timestamp() {
    let _ = env_logger::try_init();
    let (status, body) = get_request(&bot_headers(), "/bot/ping", configure_untouched_backend).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["ok"], true);
    assert!(response["ts"].is_string(), "Expected a timestamp, got: {body}");
}

#[actix_web::test]
async fn interaction_reports_are_echoed_back() {
    let _ = env_logger::try_init();
    let body = json!({
        "discordId": "99887766",
        "serverId": "server1",
        "type": "slash_command",
        "command": "comprar"
    });
    let (status, body) =
        post_request(&bot_headers(), "/bot/interactions", body, configure_untouched_backend).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["ok"], true);
    assert_eq!(response["interaction"]["command"], "comprar");
    assert!(response["interaction"]["receivedAt"].is_string(), "Expected a receipt timestamp, got: {body}");
}

#[actix_web::test]
async fn interaction_reports_must_be_complete() {
    let _ = env_logger::try_init();
    let body = json!({"discordId": "99887766", "serverId": "server1"});
    let err = post_request(&bot_headers(), "/bot/interactions", body, configure_untouched_backend)
        .await
        .expect_err("Expected error");
    assert!(err.contains("Missing required fields: type, command"), "Unexpected error: {err}");
}
