//! # VIP sync engine public API
//!
//! The `vse_api` module exposes the programmatic API for the VIP sync engine.
//! The API is modular, so that clients of the API can pick and choose the functionality they want.
//! Or different parts (e.g. the order flow and the outbox) could be configured on different machines.
//!
//! * [`order_flow_api`] is the primary API for the purchase flow. It records checkout orders and applies payment
//!   webhooks to the ledger, and it drives the periodic VIP expiry sweep.
//! * [`entitlement_api`] serves the game-server plugins: VIP status lookups and manual grant / revoke operations.
//! * [`outbox_api`] is the Discord bot's view of the notification queue, with idempotent acknowledgement.
//! * [`linking_api`] manages the single-use sessions that bind a Discord member to a Steam account.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying a database backend that
//! implements the specific backend traits required by the API.
//!
//! For example, to create an API instance to query entitlements on the database:
//!
//! ```rust,ignore
//! use vip_sync_engine::{EntitlementApi, ServerRegistry, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let registry = ServerRegistry::from_csv("server1,server2");
//! // SqliteDatabase implements EntitlementManagement
//! let api = EntitlementApi::new(db, registry);
//! // use the api to access information
//! let status = api.vip_status(&server_id, &steam_id).await?;
//! ```

pub mod entitlement_api;
pub mod linking_api;
pub mod order_flow_api;
pub mod outbox_api;
