use log::*;
use vss_common::Secret;

pub const DEFAULT_INFINITEPAY_API_URL: &str = "https://api.infinitepay.io";

#[derive(Debug, Clone, Default)]
pub struct InfinitePayConfig {
    pub api_url: String,
    /// The merchant handle, used as the bearer token on checkout link requests.
    pub handle: Secret<String>,
}

impl InfinitePayConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("INFINITEPAY_API_URL").unwrap_or_else(|_| {
            info!("INFINITEPAY_API_URL not set, using {DEFAULT_INFINITEPAY_API_URL}");
            DEFAULT_INFINITEPAY_API_URL.to_string()
        });
        let handle = Secret::new(std::env::var("INFINITEPAY_HANDLE").unwrap_or_else(|_| {
            warn!("INFINITEPAY_HANDLE not set, using (probably useless) default");
            "$demo_handle".to_string()
        }));
        Self { api_url, handle }
    }
}
