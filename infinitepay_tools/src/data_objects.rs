use serde::{Deserialize, Serialize};
use serde_json::Value;
use vss_common::Price;

/// The body of a checkout link request.
///
/// `amount` serializes as decimal reais, which is what the provider bills in. The field names are
/// the provider's, so this struct serializes straight into the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLinkRequest {
    pub amount: Price,
    pub description: String,
    pub order_nsu: String,
    pub redirect_url: String,
    pub webhook_url: String,
    pub metadata: CheckoutMetadata,
}

impl CheckoutLinkRequest {
    pub fn new(
        amount: Price,
        order_nsu: String,
        server_id: &str,
        vip_type: &str,
        discord_id: &str,
        redirect_url: String,
        webhook_url: String,
    ) -> Self {
        let description = format!("Rust {} - {}", server_id.to_uppercase(), vip_type.to_uppercase());
        let metadata = CheckoutMetadata {
            discord_id: discord_id.to_string(),
            server_id: server_id.to_string(),
            vip_type: vip_type.to_string(),
        };
        Self { amount, description, order_nsu, redirect_url, webhook_url, metadata }
    }
}

/// Echoed back verbatim in payment webhooks, so the camelCase key names matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    #[serde(rename = "discordId")]
    pub discord_id: String,
    #[serde(rename = "serverId")]
    pub server_id: String,
    #[serde(rename = "vipType")]
    pub vip_type: String,
}

/// The provider has served the link under different keys across API revisions, so try each known
/// location in turn.
pub fn extract_checkout_url(response: &Value) -> Option<String> {
    response["url"]
        .as_str()
        .or_else(|| response["checkout_url"].as_str())
        .or_else(|| response["data"]["url"].as_str())
        .map(|s| s.to_string())
}
