//! Rate-limit middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::GuardError;
use crate::principal::{HeaderPrincipalResolver, RequestContext};
use crate::rate_limit::{RateLimitResult, RateLimiter};

/// Middleware state for [`rate_limit`]
#[derive(Clone)]
pub struct RateLimitLayerState {
    pub limiter: Arc<dyn RateLimiter>,
    /// Header identifying the caller; falls back to the client ip
    pub caller_header: HeaderName,
}

impl RateLimitLayerState {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter,
            caller_header: HeaderName::from_static(HeaderPrincipalResolver::DEFAULT_HEADER),
        }
    }

    fn caller(&self, headers: &HeaderMap, path: &str) -> String {
        if let Some(user) = headers
            .get(&self.caller_header)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
        {
            return format!("user:{}", user.trim());
        }
        match RequestContext::from_parts(headers, path).ip {
            Some(ip) => format!("ip:{}", ip),
            None => "anonymous".to_string(),
        }
    }
}

/// Count the request against its `(caller, route)` window.
///
/// Limiter failures let the request through; throttling is not an
/// authorization decision.
pub async fn rate_limit(
    State(state): State<RateLimitLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let route = request.uri().path().to_string();
    let caller = state.caller(request.headers(), &route);

    let result = match state.limiter.check(&caller, &route).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, route = %route, "Rate limiter unavailable, allowing request");
            return next.run(request).await;
        }
    };

    let mut response = if result.success {
        next.run(request).await
    } else {
        GuardError::RateLimited {
            route,
            retry_after_secs: result.retry_after_secs().unwrap_or(1),
        }
        .into_response()
    };
    apply_headers(response.headers_mut(), &result);
    response
}

fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(result.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(result.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(result.reset_time.timestamp().max(0) as u64),
    );
    if let Some(secs) = result.retry_after_secs() {
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs));
    }
}
