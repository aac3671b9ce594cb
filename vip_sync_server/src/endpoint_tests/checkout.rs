use actix_web::{http::StatusCode, web, web::ServiceConfig};
use infinitepay_tools::InfinitePayApiError;
use serde_json::{json, Value};
use vip_sync_engine::{
    db_types::{NewOrder, Order, PaymentStatus},
    OrderFlowApi,
};

use crate::{
    endpoint_tests::{
        helpers::{get_request, post_request, test_options, test_registry},
        mocks::{MockProvider, MockVipDb},
    },
    infinitepay_routes::{CheckoutFormRoute, CheckoutRoute},
};

const CHECKOUT_URL: &str = "https://checkout.infinitepay.io/pay/abc123";

fn order_from_new(order: NewOrder) -> Order {
    Order {
        id: 1,
        order_id: order.order_id,
        transaction_id: None,
        discord_id: order.discord_id,
        server_id: order.server_id,
        vip_tier: order.vip_tier,
        amount: order.amount,
        status: PaymentStatus::Pending,
        checkout_url: order.checkout_url,
        idempotency_key: order.idempotency_key,
        created_at: order.created_at,
        updated_at: order.created_at,
    }
}

fn register(cfg: &mut ServiceConfig, db: MockVipDb, provider: MockProvider) {
    let api = OrderFlowApi::new(db, test_registry());
    cfg.service(CheckoutRoute::<MockVipDb, MockProvider>::new())
        .service(CheckoutFormRoute::<MockVipDb, MockProvider>::new())
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(provider))
        .app_data(web::Data::new(test_options()));
}

fn configure_happy_path(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_insert_order().returning(|order| Ok((order_from_new(order), true)));
    let mut provider = MockProvider::new();
    provider.expect_create_checkout_link().returning(|_| Ok(CHECKOUT_URL.to_string()));
    register(cfg, db, provider);
}

fn configure_untouched_backend(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_insert_order().times(0);
    let mut provider = MockProvider::new();
    provider.expect_create_checkout_link().times(0);
    register(cfg, db, provider);
}

fn configure_replay(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_fetch_order_by_idempotency_key().withf(|key| key == "retry-1").returning(|_| {
        let stored = NewOrder::new(
            "ORD-1718000000000-00c0ffee".to_string().into(),
            "99887766".into(),
            "server1".into(),
            "vip".parse().unwrap(),
            "29.90".parse().unwrap(),
            CHECKOUT_URL.to_string(),
        )
        .with_idempotency_key("retry-1");
        Ok(Some(order_from_new(stored)))
    });
    db.expect_insert_order().times(0);
    let mut provider = MockProvider::new();
    provider.expect_create_checkout_link().times(0);
    register(cfg, db, provider);
}

fn configure_provider_down(cfg: &mut ServiceConfig) {
    let mut db = MockVipDb::new();
    db.expect_insert_order().times(0);
    let mut provider = MockProvider::new();
    provider
        .expect_create_checkout_link()
        .returning(|_| Err(InfinitePayApiError::SendError("connection refused".to_string())));
    register(cfg, db, provider);
}

#[actix_web::test]
async fn checkout_returns_a_payment_link() {
    let _ = env_logger::try_init();
    let body = json!({"discordId": "99887766", "serverId": "server1", "vipType": "vip"});
    let (status, body) = post_request(&[], "/checkout", body, configure_happy_path).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["checkoutUrl"], CHECKOUT_URL);
    let nsu = response["orderNsu"].as_str().expect("orderNsu missing");
    assert!(nsu.starts_with("ORD-"), "Unexpected order NSU: {nsu}");
}

#[actix_web::test]
async fn checkout_works_from_a_query_string_too() {
    let _ = env_logger::try_init();
    let path = "/checkout?discordId=99887766&serverId=server1&vipType=vip";
    let (status, body) = get_request(&[], path, configure_happy_path).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["checkoutUrl"], CHECKOUT_URL);
}

#[actix_web::test]
async fn checkout_rejects_unknown_servers() {
    let _ = env_logger::try_init();
    let body = json!({"discordId": "99887766", "serverId": "atlantis", "vipType": "vip"});
    let err = post_request(&[], "/checkout", body, configure_untouched_backend).await.expect_err("Expected error");
    assert!(err.contains("Server atlantis is not in the registry"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn checkout_rejects_a_blank_discord_id() {
    let _ = env_logger::try_init();
    let body = json!({"discordId": "   ", "serverId": "server1", "vipType": "vip"});
    let err = post_request(&[], "/checkout", body, configure_untouched_backend).await.expect_err("Expected error");
    assert!(err.contains("discordId must not be empty"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn checkout_rejects_unknown_tiers() {
    let _ = env_logger::try_init();
    let body = json!({"discordId": "99887766", "serverId": "server1", "vipType": "gold"});
    let err = post_request(&[], "/checkout", body, configure_untouched_backend).await.expect_err("Expected error");
    assert!(err.contains("Invalid VIP tier: gold"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn checkout_retries_are_answered_from_the_ledger() {
    let _ = env_logger::try_init();
    let body =
        json!({"discordId": "99887766", "serverId": "server1", "vipType": "vip", "idempotencyKey": "retry-1"});
    let (status, body) = post_request(&[], "/checkout", body, configure_replay).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).expect("Invalid JSON response");
    assert_eq!(response["checkoutUrl"], CHECKOUT_URL);
    assert_eq!(response["orderNsu"], "ORD-1718000000000-00c0ffee");
}

#[actix_web::test]
async fn a_provider_failure_leaves_no_order_behind() {
    let _ = env_logger::try_init();
    let body = json!({"discordId": "99887766", "serverId": "server1", "vipType": "vip+"});
    let err = post_request(&[], "/checkout", body, configure_provider_down).await.expect_err("Expected error");
    assert!(err.contains("An upstream service failed"), "Unexpected error: {err}");
    assert!(err.contains("Could not reach InfinitePay"), "Unexpected error: {err}");
}

#[actix_web::test]
async fn checkout_requires_a_json_body() {
    let _ = env_logger::try_init();
    let err = post_request(&[], "/checkout", Value::Null, configure_untouched_backend).await.expect_err("Expected error");
    assert!(err.contains("Json deserialize error"), "Unexpected error: {err}");
}
