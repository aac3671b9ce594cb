use chrono::{DateTime, Duration, Utc};
use infinitepay_tools::{CheckoutLinkRequest, InfinitePayApiError, PaymentLinkProvider};
use mockall::mock;
use vip_sync_engine::{
    db_types::{
        DiscordId,
        Entitlement,
        EntitlementKey,
        EntitlementUpdate,
        EventId,
        LinkSession,
        NewOrder,
        Order,
        OrderId,
        OutboxEvent,
        PaymentStatus,
        ServerId,
        SessionId,
        SteamId,
    },
    traits::{
        AckOutcome,
        DemotedVip,
        EntitlementApiError,
        EntitlementManagement,
        LinkedIdentity,
        NewOutboxEvent,
        OutboxApiError,
        OutboxManagement,
        PaymentUpdateOutcome,
        VipGatewayDatabase,
        VipGatewayError,
    },
};

use crate::steam_openid::{IdentityVerifier, SteamOpenIdError};

// `vip_status` and `close` have default implementations, so they are deliberately left out of the
// mocks. `vip_status` then drives `expect_fetch_entitlement`, which is what the tests care about.
mock! {
    pub VipDb {}

    impl Clone for VipDb {
        fn clone(&self) -> Self;
    }

    impl EntitlementManagement for VipDb {
        async fn upsert_entitlement(&self, server_id: &ServerId, update: EntitlementUpdate) -> Result<Entitlement, EntitlementApiError>;
        async fn fetch_entitlement(&self, server_id: &ServerId, key: &EntitlementKey) -> Result<Option<Entitlement>, EntitlementApiError>;
        async fn fetch_entitlements_for_server(&self, server_id: &ServerId) -> Result<Vec<Entitlement>, EntitlementApiError>;
        async fn clear_vip(&self, server_id: &ServerId, steam_id: &SteamId) -> Result<Entitlement, EntitlementApiError>;
    }

    impl OutboxManagement for VipDb {
        async fn enqueue_event(&self, event: NewOutboxEvent) -> Result<OutboxEvent, OutboxApiError>;
        async fn fetch_pending_events(&self) -> Result<Vec<OutboxEvent>, OutboxApiError>;
        async fn ack_event(&self, event_id: &EventId, now: DateTime<Utc>) -> Result<AckOutcome, OutboxApiError>;
        async fn purge_processed_events(&self, cutoff: DateTime<Utc>) -> Result<u64, OutboxApiError>;
    }

    impl VipGatewayDatabase for VipDb {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), VipGatewayError>;
        async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, VipGatewayError>;
        async fn fetch_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, VipGatewayError>;
        async fn process_payment_update(&self, order_id: &OrderId, transaction_id: &str, status: PaymentStatus, now: DateTime<Utc>) -> Result<PaymentUpdateOutcome, VipGatewayError>;
        async fn expire_vip_entitlements(&self, server_id: &ServerId, now: DateTime<Utc>) -> Result<Vec<DemotedVip>, VipGatewayError>;
        async fn create_link_session(&self, discord_id: &DiscordId, server_id: &ServerId) -> Result<LinkSession, VipGatewayError>;
        async fn consume_link_session(&self, session_id: &SessionId, steam_id: &SteamId, ttl: Duration, now: DateTime<Utc>) -> Result<LinkedIdentity, VipGatewayError>;
        async fn prune_link_sessions(&self, ttl: Duration, now: DateTime<Utc>) -> Result<u64, VipGatewayError>;
    }
}

mock! {
    pub Entitlements {}
    impl EntitlementManagement for Entitlements {
        async fn upsert_entitlement(&self, server_id: &ServerId, update: EntitlementUpdate) -> Result<Entitlement, EntitlementApiError>;
        async fn fetch_entitlement(&self, server_id: &ServerId, key: &EntitlementKey) -> Result<Option<Entitlement>, EntitlementApiError>;
        async fn fetch_entitlements_for_server(&self, server_id: &ServerId) -> Result<Vec<Entitlement>, EntitlementApiError>;
        async fn clear_vip(&self, server_id: &ServerId, steam_id: &SteamId) -> Result<Entitlement, EntitlementApiError>;
    }
}

mock! {
    pub Outbox {}
    impl OutboxManagement for Outbox {
        async fn enqueue_event(&self, event: NewOutboxEvent) -> Result<OutboxEvent, OutboxApiError>;
        async fn fetch_pending_events(&self) -> Result<Vec<OutboxEvent>, OutboxApiError>;
        async fn ack_event(&self, event_id: &EventId, now: DateTime<Utc>) -> Result<AckOutcome, OutboxApiError>;
        async fn purge_processed_events(&self, cutoff: DateTime<Utc>) -> Result<u64, OutboxApiError>;
    }
}

mock! {
    pub Provider {}
    impl PaymentLinkProvider for Provider {
        async fn create_checkout_link(&self, request: &CheckoutLinkRequest) -> Result<String, InfinitePayApiError>;
    }
}

mock! {
    pub Verifier {}
    impl IdentityVerifier for Verifier {
        fn login_url(&self, return_to: &str) -> Result<String, SteamOpenIdError>;
        async fn verify(&self, query: &str) -> Result<SteamId, SteamOpenIdError>;
    }
}
