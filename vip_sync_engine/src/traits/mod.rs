//! # Backend interface contracts.
//!
//! This module defines the behaviour a database backend needs to expose in order to act as a
//! store for the VIP sync engine.
//!
//! * [`VipGatewayDatabase`] defines the highest level of behaviour: the checkout ledger, webhook
//!   driven entitlement extension, the expiry sweep and the single-use linking sessions. Every
//!   multi-store mutation behind this trait is a single database transaction.
//! * [`EntitlementManagement`] provides the per-server player records and the computed VIP read
//!   model served to game plugins.
//! * [`OutboxManagement`] provides the at-least-once delivery queue consumed by the Discord bot.
mod entitlement_management;
mod outbox_management;
mod vip_gateway_database;

mod data_objects;

pub use data_objects::{AckOutcome, DemotedVip, LinkedIdentity, NewOutboxEvent, PaymentUpdateOutcome, SweepResult};
pub use entitlement_management::{EntitlementApiError, EntitlementManagement};
pub use outbox_management::{OutboxApiError, OutboxManagement};
pub use vip_gateway_database::{VipGatewayDatabase, VipGatewayError};
