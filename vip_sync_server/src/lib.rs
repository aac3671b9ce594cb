//! # VIP sync server
//! This module hosts the REST server for the VIP sync gateway. It is responsible for:
//! Handing out payment checkout links for VIP purchases.
//! Receiving payment status webhooks from InfinitePay and applying them to the ledger.
//! Serving the Discord bot's notification poll and the game plugins' VIP status checks.
//! Driving the Steam OpenID account-linking round trip.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following scopes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/payments`: Checkout link creation, called by the Discord bot.
//! * `/webhooks`: Payment status updates posted by InfinitePay.
//! * `/auth`: The Steam OpenID linking flow.
//! * `/bot`: The Discord bot's event poll, acknowledgements and diagnostics.
//! * `/plugin`: VIP status lookups and manual grants for the game-server plugins.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod infinitepay_routes;
pub mod maintenance_worker;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod steam_openid;
pub mod steam_routes;

#[cfg(test)]
mod endpoint_tests;
