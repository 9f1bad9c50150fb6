//! Request context and principal resolution

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, Request};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated identity making a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ip: None,
            user_agent: None,
        }
    }

    /// Attach the client address and user agent seen on the request
    pub fn with_origin(mut self, ctx: &RequestContext) -> Self {
        self.ip = ctx.ip.clone();
        self.user_agent = ctx.user_agent.clone();
        self
    }
}

/// Request metadata the guard needs, detached from the request body
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub path: String,
    pub headers: HeaderMap,
}

pub const REQUEST_ID_HEADER: &str = "x-request-id";

impl RequestContext {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::from_parts(request.headers(), request.uri().path())
    }

    pub fn from_parts(headers: &HeaderMap, path: &str) -> Self {
        let request_id = header_str(headers, REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            ip: client_ip(headers),
            user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
            path: path.to_string(),
            headers: headers.clone(),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// First hop of `x-forwarded-for`, then `x-real-ip`
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_string)
}

/// Resolves who is making a request. `None` means unauthenticated.
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn current_principal(&self, ctx: &RequestContext) -> Option<Principal>;
}

/// Trusts a user-id header set by an upstream authenticator
#[derive(Debug, Clone)]
pub struct HeaderPrincipalResolver {
    header: HeaderName,
}

impl HeaderPrincipalResolver {
    pub const DEFAULT_HEADER: &'static str = "x-user-id";

    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for HeaderPrincipalResolver {
    fn default() -> Self {
        Self::new(HeaderName::from_static(Self::DEFAULT_HEADER))
    }
}

#[async_trait]
impl PrincipalResolver for HeaderPrincipalResolver {
    async fn current_principal(&self, ctx: &RequestContext) -> Option<Principal> {
        header_str(&ctx.headers, self.header.as_str())
            .map(|user_id| Principal::new(user_id).with_origin(ctx))
    }
}
