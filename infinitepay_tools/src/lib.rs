mod api;
mod config;
mod error;

mod data_objects;

pub use api::{InfinitePayApi, PaymentLinkProvider, CHECKOUT_LINK_PATH};
pub use config::InfinitePayConfig;
pub use data_objects::{extract_checkout_url, CheckoutLinkRequest, CheckoutMetadata};
pub use error::InfinitePayApiError;
