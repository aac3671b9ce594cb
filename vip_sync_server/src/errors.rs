use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use infinitepay_tools::InfinitePayApiError;
use thiserror::Error;
use vip_sync_engine::{EntitlementApiError, OutboxApiError, VipGatewayError};

use crate::steam_openid::SteamOpenIdError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("Authentication error. {0}")]
    AuthenticationError(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request conflicts with stored state. {0}")]
    Conflict(String),
    #[error("An upstream service failed. {0}")]
    UpstreamError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<VipGatewayError> for ServerError {
    fn from(e: VipGatewayError) -> Self {
        let msg = e.to_string();
        match e {
            VipGatewayError::EntitlementError(inner) => inner.into(),
            VipGatewayError::OutboxError(inner) => inner.into(),
            VipGatewayError::UnsupportedServer(_) => Self::InvalidRequest(msg),
            VipGatewayError::OrderNotFound(_) | VipGatewayError::OrderIdNotFound(_) => Self::NoRecordFound(msg),
            VipGatewayError::SessionNotFound(_) => Self::NoRecordFound(msg),
            VipGatewayError::OrderAlreadyExists(_) |
            VipGatewayError::DuplicateTransaction { .. } |
            VipGatewayError::SessionAlreadyUsed(_) |
            VipGatewayError::SessionExpired(_) => Self::Conflict(msg),
            VipGatewayError::DatabaseError(_) => Self::BackendError(msg),
        }
    }
}

impl From<EntitlementApiError> for ServerError {
    fn from(e: EntitlementApiError) -> Self {
        let msg = e.to_string();
        match e {
            EntitlementApiError::PlayerNotFound(_) => Self::NoRecordFound(msg),
            EntitlementApiError::DuplicateIdentity(_) => Self::Conflict(msg),
            EntitlementApiError::UnsupportedServer(_) | EntitlementApiError::EmptyUpdate => Self::InvalidRequest(msg),
            EntitlementApiError::DatabaseError(_) => Self::BackendError(msg),
        }
    }
}

impl From<OutboxApiError> for ServerError {
    fn from(e: OutboxApiError) -> Self {
        match e {
            OutboxApiError::EventNotFound(_) => Self::NoRecordFound(e.to_string()),
            OutboxApiError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<InfinitePayApiError> for ServerError {
    fn from(e: InfinitePayApiError) -> Self {
        Self::UpstreamError(e.to_string())
    }
}

impl From<SteamOpenIdError> for ServerError {
    fn from(e: SteamOpenIdError) -> Self {
        let msg = e.to_string();
        match e {
            SteamOpenIdError::AssertionRejected => Self::AuthenticationError(msg),
            SteamOpenIdError::MissingClaimedId | SteamOpenIdError::MalformedClaimedId(_) => Self::InvalidRequest(msg),
            SteamOpenIdError::InvalidCallback(_) => Self::InvalidRequest(msg),
            SteamOpenIdError::SendError(_) => Self::UpstreamError(msg),
            SteamOpenIdError::Initialization(_) | SteamOpenIdError::UrlError(_) => Self::InitializeError(msg),
        }
    }
}
