//! VIP Sync Engine
//!
//! The VIP sync engine is the core of a gateway that sells VIP entitlements for a set of game servers and keeps
//! every consumer of those entitlements (game plugins, a Discord bot, the payment provider's webhooks) looking at
//! the same state. This library contains the core logic. It is HTTP-framework agnostic.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly.
//!    Instead, use the public API provided by the engine. The exception is the data types used in the database.
//!    These are defined in the [`db_types`] module and are public.
//! 2. The engine public API ([`mod@vse_api`]). This provides the public-facing functionality of the engine: the
//!    order and webhook flow, entitlement lookups, the notification outbox and Discord-to-Steam account linking.
//!    Specific backends need to implement the traits in the [`traits`] module in order to act as a backend for the
//!    VIP sync server.
#[cfg(feature = "sqlite")]
mod sqlite;

pub mod db_types;
pub mod helpers;
pub mod traits;
mod vse_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    AckOutcome,
    DemotedVip,
    EntitlementApiError,
    EntitlementManagement,
    LinkedIdentity,
    NewOutboxEvent,
    OutboxApiError,
    OutboxManagement,
    PaymentUpdateOutcome,
    SweepResult,
    VipGatewayDatabase,
    VipGatewayError,
};
pub use vse_api::{
    entitlement_api::EntitlementApi,
    linking_api::LinkingApi,
    order_flow_api::OrderFlowApi,
    outbox_api::OutboxApi,
};
