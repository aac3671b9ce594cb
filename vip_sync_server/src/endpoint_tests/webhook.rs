use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use vip_sync_engine::{
    db_types::{
        DiscordId,
        Entitlement,
        EventId,
        EventType,
        Order,
        OrderId,
        OutboxEvent,
        PaymentStatus,
        ServerId,
        SteamId,
        VipTier,
    },
    traits::{PaymentUpdateOutcome, VipGatewayError},
    OrderFlowApi,
};
use vss_common::{Price, Secret};

use crate::{
    endpoint_tests::{
        helpers::{post_request, test_registry},
        mocks::MockVipDb,
    },
    infinitepay_routes::InfinitepayWebhookRoute,
    middleware::ApiKeyMiddlewareFactory,
};

const ORDER_NSU: &str = "ORD-1718000000000-00c0ffee";
const TX_NSU: &str = "TX-20240610-001";

fn sample_order(order_id: &OrderId, transaction_id: &str, status: PaymentStatus) -> Order {
    let now = Utc::now();
    Order {
        id: 1,
        order_id: order_id.clone(),
        transaction_id: Some(transaction_id.to_string()),
        discord_id: DiscordId::from("99887766"),
        server_id: ServerId::new("server1"),
        vip_tier: VipTier::Vip,
        amount: Price::from_cents(2990),
        status,
        checkout_url: "https://checkout.infinitepay.io/pay/abc123".to_string(),
        idempotency_key: None,
        created_at: now,
        updated_at: now,
    }
}

fn sample_entitlement() -> Entitlement {
    let now = Utc::now();
    Entitlement {
        id: 7,
        server_id: ServerId::new("server1"),
        discord_id: Some(DiscordId::from("99887766")),
        steam_id: Some(SteamId::from("76561198012345678")),
        vip_tier: Some(VipTier::Vip),
        vip_expires_at: Some(now + Duration::days(30)),
        created_at: now,
        updated_at: now,
    }
}

fn sample_event() -> OutboxEvent {
    OutboxEvent {
        id: 1,
        event_id: EventId::random(),
        event_type: EventType::PaymentConfirmed,
        discord_id: DiscordId::from("99887766"),
        server_id: ServerId::new("server1"),
        vip_tier: Some(VipTier::Vip),
        created_at: Utc::now(),
        processed: false,
        processed_at: None,
    }
}

fn register(cfg: &mut ServiceConfig, db: MockVipDb, secret: Option<Secret<String>>) {
    let api = OrderFlowApi::new(db, test_registry());
    cfg.service(
        web::scope("/webhooks")
            .wrap(ApiKeyMiddlewareFactory::optional("x-webhook-secret", secret))
            .service(InfinitepayWebhookRoute::<MockVipDb>::new()),
    )
    .app_data(web::Data::new(api));
}

fn secured(cfg: &mut ServiceConfig, db: MockVipDb) {
    register(cfg, db, Some(Secret::new("hook-secret".to_string())));
}

fn configure_confirming(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_process_payment_update().returning(|order_id, transaction_id, status, _now| {
        assert!(status.is_success(), "Expected a success-class status, got {status}");
        Ok(PaymentUpdateOutcome {
            order: sample_order(order_id, transaction_id, status),
            entitlement: Some(sample_entitlement()),
            event: Some(sample_event()),
        })
    });
    secured(cfg, db);
}

fn configure_recording(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_process_payment_update().returning(|order_id, transaction_id, status, _now| {
        Ok(PaymentUpdateOutcome {
            order: sample_order(order_id, transaction_id, status),
            entitlement: None,
            event: None,
        })
    });
    secured(cfg, db);
}

fn configure_duplicate(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_process_payment_update().returning(|order_id, transaction_id, _status, _now| {
        Err(VipGatewayError::DuplicateTransaction {
            order_id: order_id.clone(),
            transaction_id: transaction_id.to_string(),
        })
    });
    secured(cfg, db);
}

fn configure_unknown_order(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_process_payment_update()
        .returning(|order_id, _tx, _status, _now| Err(VipGatewayError::OrderNotFound(order_id.clone())));
    secured(cfg, db);
}

fn configure_untouched_backend(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_process_payment_update().times(0);
    secured(cfg, db);
}

fn configure_unsecured(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_process_payment_update().returning(|order_id, transaction_id, status, _now| {
        Ok(PaymentUpdateOutcome {
            order: sample_order(order_id, transaction_id, status),
            entitlement: Some(sample_entitlement()),
            event: Some(sample_event()),
        })
    });
    register(cfg, db, None);
}

fn hook_headers() -> [(&'static str, &'static str); 1] {
    [("x-webhook-secret", "hook-secret")]
}

#[actix_web::test]
async fn a_success_status_confirms_the_order() {
    let _ = env_logger::try_init();
    let body = json!({"order_nsu": ORDER_NSU, "transaction_nsu": TX_NSU, "status": "approved"});
    let (status, body) =
        post_request(&hook_headers(), "/webhooks/infinitepay", body, configure_confirming).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["success"], true);
    assert!(response["message"].as_str().unwrap_or_default().contains("confirmed"), "Unexpected body: {body}");
}

#[actix_web::test]
async fn a_non_success_status_is_recorded_without_confirmation() {
    let _ = env_logger::try_init();
    let body = json!({"order_nsu": ORDER_NSU, "transaction_nsu": TX_NSU, "status": "declined"});
    let (status, body) =
        post_request(&hook_headers(), "/webhooks/infinitepay", body, configure_recording).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["success"], true);
    assert!(response["message"].as_str().unwrap_or_default().contains("recorded"), "Unexpected body: {body}");
}

#[actix_web::test]
async fn nested_payloads_are_understood() {
    let _ = env_logger::try_init();
    let body = json!({
        "order": { "order_nsu": ORDER_NSU },
        "transaction": { "transaction_nsu": TX_NSU },
        "transaction_status": "paid"
    });
    let (status, body) =
        post_request(&hook_headers(), "/webhooks/infinitepay", body, configure_confirming).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["success"], true);
}

#[actix_web::test]
async fn redelivered_webhooks_answer_success_false() {
    let _ = env_logger::try_init();
    let body = json!({"order_nsu": ORDER_NSU, "transaction_nsu": TX_NSU, "status": "approved"});
    let (status, body) =
        post_request(&hook_headers(), "/webhooks/infinitepay", body, configure_duplicate).await.expect("Request failed");
    // 200, not an error status. The provider must stop retrying a webhook we have already applied.
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["success"], false);
    assert!(response["message"].as_str().unwrap_or_default().contains("already processed"), "Unexpected body: {body}");
}

#[actix_web::test]
async fn an_unknown_order_is_not_found() {
    let _ = env_logger::try_init();
    let body = json!({"order_nsu": "ORD-0000000000000-deadbeef", "transaction_nsu": TX_NSU, "status": "approved"});
    let err = post_request(&hook_headers(), "/webhooks/infinitepay", body, configure_unknown_order)
        .await
        .expect_err("Expected error");
    assert!(err.contains("The data was not found"), "Unexpected error: {err}");
    assert!(err.contains("does not exist"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn webhooks_without_an_order_nsu_are_rejected() {
    let _ = env_logger::try_init();
    let body = json!({"transaction_nsu": TX_NSU, "status": "approved"});
    let err = post_request(&hook_headers(), "/webhooks/infinitepay", body, configure_untouched_backend)
        .await
        .expect_err("Expected error");
    assert!(err.contains("does not carry an order NSU"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn webhooks_without_a_transaction_nsu_are_rejected() {
    let _ = env_logger::try_init();
    let body = json!({"order_nsu": ORDER_NSU, "status": "approved"});
    let err = post_request(&hook_headers(), "/webhooks/infinitepay", body, configure_untouched_backend)
        .await
        .expect_err("Expected error");
    assert!(err.contains("does not carry a transaction NSU"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn the_webhook_secret_is_enforced_when_configured() {
    let _ = env_logger::try_init();
    let body = json!({"order_nsu": ORDER_NSU, "transaction_nsu": TX_NSU, "status": "approved"});
    let err = post_request(&[("x-webhook-secret", "wrong")], "/webhooks/infinitepay", body, configure_untouched_backend)
        .await
        .expect_err("Expected error");
    assert!(err.contains("Invalid API key"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn a_missing_secret_is_rejected_when_one_is_configured() {
    let _ = env_logger::try_init();
    let body = json!({"order_nsu": ORDER_NSU, "transaction_nsu": TX_NSU, "status": "approved"});
    let err = post_request(&[], "/webhooks/infinitepay", body, configure_untouched_backend)
        .await
        .expect_err("Expected error");
    assert!(err.contains("No API key presented"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn the_webhook_is_open_when_no_secret_is_configured() {
    let _ = env_logger::try_init();
    let body = json!({"order_nsu": ORDER_NSU, "transaction_nsu": TX_NSU, "status": "confirmed"});
    let (status, _) =
        post_request(&[], "/webhooks/infinitepay", body, configure_unsecured).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
}
