//! Axum middleware enforcing a named rate limit policy.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::ratelimit::{
    get_client_ip, rate_limit_headers, rate_limit_middleware, RateLimitPolicy, RateLimitRejection,
    RateLimiter,
};

/// A policy bound to a shared limiter.
///
/// Identifiers are scoped as `<scope>:<client ip>` so routes under different
/// policies keep separate budgets.
#[derive(Clone)]
pub struct RouteLimit {
    limiter: Arc<RateLimiter>,
    scope: String,
    policy: RateLimitPolicy,
}

impl RouteLimit {
    pub fn new(limiter: Arc<RateLimiter>, scope: impl Into<String>, policy: RateLimitPolicy) -> Self {
        Self {
            limiter,
            scope: scope.into(),
            policy,
        }
    }
}

/// Reject over-budget requests with `429`, otherwise run the route and
/// attach `X-RateLimit-*` headers to its response.
///
/// Use with [`axum::middleware::from_fn_with_state`].
pub async fn enforce_rate_limit(
    State(limit): State<RouteLimit>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = format!("{}:{}", limit.scope, get_client_ip(request.headers()));
    let decision = rate_limit_middleware(
        limit.limiter.as_ref(),
        request.headers(),
        &limit.policy,
        Some(&identifier),
    );

    match decision {
        Ok(result) => {
            let mut response = next.run(request).await;
            response.headers_mut().extend(rate_limit_headers(&result));
            response
        }
        Err(rejection) => rejection.into_response(),
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let headers = self.headers();
        (StatusCode::TOO_MANY_REQUESTS, headers, Json(self.body)).into_response()
    }
}
