use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfinitePayApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach InfinitePay: {0}")]
    SendError(String),
    #[error("Invalid provider response: {0}")]
    ResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Checkout link request failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The provider response did not include a checkout link")]
    MissingCheckoutUrl,
}
