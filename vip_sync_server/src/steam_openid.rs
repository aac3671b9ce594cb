//! Steam OpenID 2.0 login and verification.
//!
//! Steam is the identity provider for the account-linking flow. The player signs in on
//! steamcommunity.com and Steam redirects back to the configured return URL with a signed
//! assertion in the query string. The assertion is verified server-side by replaying it to Steam
//! with `openid.mode=check_authentication`; the SteamID64 is the numeric tail of the claimed id.

use std::{sync::Arc, time::Duration};

use log::*;
use regex::Regex;
use reqwest::{Client, Url};
use thiserror::Error;
use vip_sync_engine::db_types::SteamId;

pub const STEAM_OPENID_ENDPOINT: &str = "https://steamcommunity.com/openid/login";
const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";
const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SteamOpenIdError {
    #[error("Could not initialize the Steam OpenID client. {0}")]
    Initialization(String),
    #[error("Could not build the Steam login URL. {0}")]
    UrlError(String),
    #[error("Could not reach Steam. {0}")]
    SendError(String),
    #[error("Steam rejected the login assertion.")]
    AssertionRejected,
    #[error("The callback does not carry a claimed id.")]
    MissingClaimedId,
    #[error("Could not extract a SteamID64 from claimed id '{0}'.")]
    MalformedClaimedId(String),
    #[error("The callback query string is invalid. {0}")]
    InvalidCallback(String),
}

/// Anything that can send a player to an identity provider and turn the resulting callback into a
/// verified Steam identity.
#[allow(async_fn_in_trait)]
pub trait IdentityVerifier {
    /// The provider login URL to redirect the player to. `return_to` is the URL the provider
    /// sends the player back to once they have signed in.
    fn login_url(&self, return_to: &str) -> Result<String, SteamOpenIdError>;

    /// Verifies a callback query string with the provider and returns the proven Steam id.
    async fn verify(&self, query: &str) -> Result<SteamId, SteamOpenIdError>;
}

#[derive(Clone)]
pub struct SteamOpenId {
    realm: String,
    client: Arc<Client>,
    claimed_id_re: Regex,
}

impl SteamOpenId {
    /// Creates a client with `realm` as the OpenID realm, usually the deployment's base URL.
    /// Steam shows the realm to the player on the login page.
    pub fn new(realm: &str) -> Result<Self, SteamOpenIdError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SteamOpenIdError::Initialization(e.to_string()))?;
        let claimed_id_re = Regex::new(r"/(\d+)$").map_err(|e| SteamOpenIdError::Initialization(e.to_string()))?;
        Ok(Self { realm: realm.trim_end_matches('/').to_string(), client: Arc::new(client), claimed_id_re })
    }

    fn extract_steam_id(&self, claimed_id: &str) -> Result<SteamId, SteamOpenIdError> {
        self.claimed_id_re
            .captures(claimed_id)
            .and_then(|caps| caps.get(1))
            .map(|m| SteamId::from(m.as_str()))
            .ok_or_else(|| SteamOpenIdError::MalformedClaimedId(claimed_id.to_string()))
    }
}

impl IdentityVerifier for SteamOpenId {
    fn login_url(&self, return_to: &str) -> Result<String, SteamOpenIdError> {
        let url = Url::parse_with_params(STEAM_OPENID_ENDPOINT, &[
            ("openid.ns", OPENID_NS),
            ("openid.mode", "checkid_setup"),
            ("openid.claimed_id", IDENTIFIER_SELECT),
            ("openid.identity", IDENTIFIER_SELECT),
            ("openid.return_to", return_to),
            ("openid.realm", self.realm.as_str()),
        ])
        .map_err(|e| SteamOpenIdError::UrlError(e.to_string()))?;
        Ok(url.into())
    }

    async fn verify(&self, query: &str) -> Result<SteamId, SteamOpenIdError> {
        let callback = Url::parse(&format!("{STEAM_OPENID_ENDPOINT}?{query}"))
            .map_err(|e| SteamOpenIdError::InvalidCallback(e.to_string()))?;
        let mut params = Vec::new();
        let mut claimed_id = None;
        for (key, value) in callback.query_pairs() {
            if !key.starts_with("openid.") {
                continue;
            }
            if key == "openid.claimed_id" {
                claimed_id = Some(value.to_string());
            }
            // The verification request is the assertion echoed back with the mode swapped
            let value = if key == "openid.mode" { "check_authentication".to_string() } else { value.to_string() };
            params.push((key.to_string(), value));
        }
        let claimed_id = claimed_id.ok_or(SteamOpenIdError::MissingClaimedId)?;
        debug!("🔗️ Verifying OpenID assertion for {claimed_id}");
        let response = self
            .client
            .post(STEAM_OPENID_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| SteamOpenIdError::SendError(e.to_string()))?;
        let body = response.text().await.map_err(|e| SteamOpenIdError::SendError(e.to_string()))?;
        if !assertion_is_valid(&body) {
            warn!("🔗️ Steam rejected an OpenID assertion for {claimed_id}");
            return Err(SteamOpenIdError::AssertionRejected);
        }
        let steam_id = self.extract_steam_id(&claimed_id)?;
        debug!("🔗️ OpenID assertion verified for steam id {steam_id}");
        Ok(steam_id)
    }
}

/// Steam answers `check_authentication` with a key-value document; `is_valid:true` means the
/// assertion is genuine.
fn assertion_is_valid(body: &str) -> bool {
    body.lines().any(|line| line.trim() == "is_valid:true")
}
