use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde_json::Value;

use crate::{
    config::InfinitePayConfig,
    data_objects::{extract_checkout_url, CheckoutLinkRequest},
    InfinitePayApiError,
};

pub const CHECKOUT_LINK_PATH: &str = "/invoices/public/checkout/links";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Anything that can turn checkout details into a payment page URL the buyer can visit.
#[allow(async_fn_in_trait)]
pub trait PaymentLinkProvider {
    async fn create_checkout_link(&self, request: &CheckoutLinkRequest) -> Result<String, InfinitePayApiError>;
}

#[derive(Clone)]
pub struct InfinitePayApi {
    config: InfinitePayConfig,
    client: Arc<Client>,
}

impl InfinitePayApi {
    pub fn new(config: InfinitePayConfig) -> Result<Self, InfinitePayApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.handle.reveal());
        let mut val =
            HeaderValue::from_str(&bearer).map_err(|e| InfinitePayApiError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert(AUTHORIZATION, val);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InfinitePayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }
}

impl PaymentLinkProvider for InfinitePayApi {
    async fn create_checkout_link(&self, request: &CheckoutLinkRequest) -> Result<String, InfinitePayApiError> {
        let url = self.url(CHECKOUT_LINK_PATH);
        debug!("Requesting checkout link for order {}", request.order_nsu);
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| InfinitePayApiError::SendError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| InfinitePayApiError::ResponseError(e.to_string()))?;
            return Err(InfinitePayApiError::QueryError { status, message });
        }
        let body = response.json::<Value>().await.map_err(|e| InfinitePayApiError::JsonError(e.to_string()))?;
        let link = extract_checkout_url(&body).ok_or(InfinitePayApiError::MissingCheckoutUrl)?;
        info!("Obtained checkout link for order {}", request.order_nsu);
        Ok(link)
    }
}
