use crate::api::error::AppError;
use crate::services::rate_limit::{ActionClass, Decision, RateLimiter};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Per-route middleware state: the process-wide limiter plus the action
/// class this route group consumes from.
#[derive(Clone)]
pub struct RateLimitContext {
    pub limiter: Arc<RateLimiter>,
    pub class: ActionClass,
}

/// Extract client IP from headers (supports proxies)
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    // Check X-Forwarded-For first (proxy)
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(ip) = val.split(',').next()
    {
        return ip.trim().to_string();
    }
    // Check X-Real-IP
    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(val) = real_ip.to_str()
    {
        return val.trim().to_string();
    }
    "unknown".to_string()
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Gate a route group behind the fixed-window limiter. A counter-store
/// outage rejects the request (503) instead of letting traffic through
/// unmetered.
pub async fn rate_limit_middleware(
    State(ctx): State<RateLimitContext>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(request.headers());
    let limit = ctx.limiter.budget(ctx.class).points;

    match ctx.limiter.attempt(ctx.class, &ip).await {
        Ok(Decision::Allowed { remaining }) => {
            let mut response = next.run(request).await;
            set_budget_headers(&mut response, limit, remaining);
            response
        }
        Ok(Decision::Denied { retry_after }) => {
            tracing::warn!(
                class = ctx.class.key(),
                %ip,
                "rate limit exceeded, rejecting request"
            );
            let mut response = AppError::RateLimited {
                retry_after_secs: retry_after.as_secs(),
            }
            .into_response();
            set_budget_headers(&mut response, limit, 0);
            response
        }
        Err(e) => AppError::Unavailable(e.to_string()).into_response(),
    }
}

fn set_budget_headers(response: &mut Response, limit: u32, remaining: u32) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
}
