//! API key middleware for Actix Web.
//!
//! All machine-to-machine endpoints authenticate with a static key in a request header: the
//! Discord bot presents `x-api-key` (or the same key as an `Authorization: Bearer` token), the
//! game-server plugins present `x-api-token`, and the payment provider may be configured to send
//! `x-webhook-secret` with its webhooks.
//!
//! Wrap a scope with this middleware to protect every route inside it. The comparison is a plain
//! equality check against the configured key.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use vss_common::Secret;

use crate::errors::ServerError;

/// What the middleware does when the server has no key configured for the scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingKeyPolicy {
    /// Reject every request. Bot and plugin scopes must never run open.
    Deny,
    /// Let requests through unchecked. Webhook secrets are optional.
    Allow,
}

pub struct ApiKeyMiddlewareFactory {
    header: String,
    key: Option<Secret<String>>,
    accept_bearer: bool,
    missing_key_policy: MissingKeyPolicy,
}

impl ApiKeyMiddlewareFactory {
    /// A key that must be configured and must match. An empty key counts as unconfigured and the
    /// scope rejects everything until one is set.
    pub fn required(header: &str, key: Secret<String>, accept_bearer: bool) -> Self {
        let key = if key.reveal().trim().is_empty() { None } else { Some(key) };
        Self { header: header.into(), key, accept_bearer, missing_key_policy: MissingKeyPolicy::Deny }
    }

    /// A key that is only checked when one is configured.
    pub fn optional(header: &str, key: Option<Secret<String>>) -> Self {
        Self { header: header.into(), key, accept_bearer: false, missing_key_policy: MissingKeyPolicy::Allow }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = ApiKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyMiddlewareService {
            header: self.header.clone(),
            key: self.key.clone(),
            accept_bearer: self.accept_bearer,
            missing_key_policy: self.missing_key_policy,
            service: Rc::new(service),
        }))
    }
}

pub struct ApiKeyMiddlewareService<S> {
    header: String,
    key: Option<Secret<String>>,
    accept_bearer: bool,
    missing_key_policy: MissingKeyPolicy,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let header = self.header.clone();
        let key = self.key.clone();
        let accept_bearer = self.accept_bearer;
        let missing_key_policy = self.missing_key_policy;
        Box::pin(async move {
            let expected = match (key, missing_key_policy) {
                (Some(key), _) => key,
                (None, MissingKeyPolicy::Allow) => {
                    trace!("🔐️ No key is configured for {header}. Allowing request.");
                    return service.call(req).await;
                },
                (None, MissingKeyPolicy::Deny) => {
                    warn!("🔐️ No key is configured for {header}. Denying access.");
                    return Err(ServerError::AuthenticationError("No API key is configured on the server.".into()).into());
                },
            };
            match presented_key(&req, &header, accept_bearer) {
                Some(presented) if presented == *expected.reveal() => {
                    trace!("🔐️ API key check for {header} ✅️");
                    service.call(req).await
                },
                Some(_) => {
                    warn!("🔐️ Invalid API key in {header}. Denying access.");
                    Err(ServerError::AuthenticationError("Invalid API key.".into()).into())
                },
                None => {
                    warn!("🔐️ No API key presented in {header}. Denying access.");
                    Err(ServerError::AuthenticationError("No API key presented.".into()).into())
                },
            }
        })
    }
}

fn presented_key(req: &ServiceRequest, header: &str, accept_bearer: bool) -> Option<String> {
    let from_header = req
        .headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if from_header.is_some() {
        return from_header;
    }
    if !accept_bearer {
        return None;
    }
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
