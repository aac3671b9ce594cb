use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// A checkout request from the Discord bot. A member has picked a VIP tier and the bot asks for a
/// payment link to hand back to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub discord_id: String,
    pub server_id: String,
    pub vip_type: String,
    /// Where the provider sends the player after payment. Defaults to the deployment's success
    /// page when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// A caller-supplied key that makes checkout retries safe. A repeat request with the same key
    /// returns the stored order instead of creating a second one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub order_nsu: String,
}

/// A payment status update from InfinitePay.
///
/// The provider has shipped a few payload shapes over time. The order NSU and transaction NSU may
/// be flat fields or nested one level down, and the status arrives in either `status` or
/// `transaction_status`. The accessors resolve the fallbacks so handlers see one shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentWebhook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_nsu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_nsu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<WebhookOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<WebhookTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookOrder {
    #[serde(default)]
    pub order_nsu: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTransaction {
    #[serde(default)]
    pub transaction_nsu: Option<String>,
}

impl PaymentWebhook {
    pub fn order_nsu(&self) -> Option<&str> {
        self.order_nsu.as_deref().or_else(|| self.order.as_ref().and_then(|o| o.order_nsu.as_deref()))
    }

    pub fn transaction_nsu(&self) -> Option<&str> {
        self.transaction_nsu.as_deref().or_else(|| self.transaction.as_ref().and_then(|t| t.transaction_nsu.as_deref()))
    }

    pub fn status_text(&self) -> &str {
        self.status.as_deref().or(self.transaction_status.as_deref()).unwrap_or_default()
    }
}

/// A manual VIP grant from a game-server admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyVipRequest {
    pub server_id: String,
    pub steam_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<String>,
    pub vip_type: String,
    /// When omitted, the grant runs for one VIP term from now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vip_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveVipRequest {
    pub server_id: String,
    pub steam_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipStatusQuery {
    pub server_id: String,
    pub steam_id: String,
}

/// A request from the bot to open a Steam linking session for a Discord member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub discord_id: String,
    pub server_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteamCallbackParams {
    pub session_id: String,
}

/// A command interaction the bot reports for validation and echo. All fields are optional on the
/// wire so the handler can name exactly which ones are missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    #[serde(default)]
    pub discord_id: Option<String>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default, rename = "type")]
    pub interaction_type: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

impl InteractionRequest {
    /// The wire names of the required fields that are absent or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.discord_id) {
            missing.push("discordId");
        }
        if is_blank(&self.server_id) {
            missing.push("serverId");
        }
        if is_blank(&self.interaction_type) {
            missing.push("type");
        }
        if is_blank(&self.command) {
            missing.push("command");
        }
        missing
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
