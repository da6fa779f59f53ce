//! Request-level rate limit check and rejection payload.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::client_ip::get_client_ip;
use super::clock::Clock;
use super::entry::{RateLimitConfig, RateLimitResult};
use super::limiter::RateLimiter;
use super::policies::RateLimitPolicy;

pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// JSON body of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub error: String,
    pub message: String,
    /// ISO-8601 instant at which the window resets
    pub reset_at: String,
}

/// A request refused because its identifier exhausted its budget.
///
/// Maps to `429 Too Many Requests`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    pub result: RateLimitResult,
    /// Whole seconds until the window resets, rounded up
    pub retry_after_secs: u64,
    pub body: RejectionBody,
}

impl RateLimitRejection {
    fn new(result: RateLimitResult, now_ms: u64) -> Self {
        let retry_after_secs = result.reset_at.saturating_sub(now_ms).div_ceil(1000);

        Self {
            result,
            retry_after_secs,
            body: RejectionBody {
                error: RATE_LIMIT_EXCEEDED.to_string(),
                message: "Too many requests. Please try again later.".to_string(),
                reset_at: iso_8601(result.reset_at),
            },
        }
    }

    /// `X-RateLimit-*` and `Retry-After` headers for the rejection.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = rate_limit_headers(&self.result);
        headers.insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(self.retry_after_secs),
        );
        headers
    }
}

/// `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
/// (epoch seconds, rounded up) for a check result.
pub fn rate_limit_headers(result: &RateLimitResult) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_at.div_ceil(1000)));
    headers
}

fn iso_8601(epoch_ms: u64) -> String {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Check a request against `policy`.
///
/// The identifier is `identifier` when supplied and non-empty, otherwise the
/// client IP from the forwarding headers.
pub fn rate_limit_middleware<C: Clock>(
    limiter: &RateLimiter<C>,
    headers: &HeaderMap,
    policy: &RateLimitPolicy,
    identifier: Option<&str>,
) -> Result<RateLimitResult, RateLimitRejection> {
    let identifier = match identifier {
        Some(identifier) if !identifier.trim().is_empty() => identifier.to_string(),
        _ => get_client_ip(headers),
    };

    check(limiter, &policy.for_identifier(identifier))
}

/// Check an explicit [`RateLimitConfig`], producing a rejection on failure.
pub fn check<C: Clock>(
    limiter: &RateLimiter<C>,
    config: &RateLimitConfig,
) -> Result<RateLimitResult, RateLimitRejection> {
    let result = limiter.check_rate_limit(config);
    if result.success {
        return Ok(result);
    }

    let rejection = RateLimitRejection::new(result, limiter.now_ms());
    info!(
        identifier = %config.identifier,
        retry_after_secs = rejection.retry_after_secs,
        "Request rejected by rate limiter"
    );
    Err(rejection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use std::time::Duration;

    // 2023-11-14T22:13:20.000Z
    const START: u64 = 1_700_000_000_000;

    fn forwarded(ip: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        headers
    }

    #[test]
    fn test_admits_within_budget() {
        let limiter = RateLimiter::with_clock(ManualClock::new(START));
        let policy = RateLimitPolicy::new(2, 60).unwrap();

        let result = rate_limit_middleware(&limiter, &forwarded("203.0.113.1"), &policy, None).unwrap();
        assert!(result.success);
        assert_eq!(result.remaining, 1);
        assert!(limiter.get_entry("203.0.113.1").is_some());
    }

    #[test]
    fn test_rejection_payload() {
        let clock = ManualClock::new(START);
        let limiter = RateLimiter::with_clock(clock.clone());
        let policy = RateLimitPolicy::new(1, 60).unwrap();
        let headers = forwarded("203.0.113.1");

        rate_limit_middleware(&limiter, &headers, &policy, None).unwrap();
        clock.advance(Duration::from_millis(15_500));
        let rejection = rate_limit_middleware(&limiter, &headers, &policy, None).unwrap_err();

        assert_eq!(rejection.body.error, RATE_LIMIT_EXCEEDED);
        assert_eq!(rejection.body.reset_at, "2023-11-14T22:14:20.000Z");
        // 44.5s left, rounded up
        assert_eq!(rejection.retry_after_secs, 45);

        let headers = rejection.headers();
        assert_eq!(headers[X_RATELIMIT_LIMIT], "1");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "0");
        assert_eq!(headers[X_RATELIMIT_RESET], "1700000060");
        assert_eq!(headers[axum::http::header::RETRY_AFTER], "45");
    }

    #[test]
    fn test_rejection_body_json_shape() {
        let limiter = RateLimiter::with_clock(ManualClock::new(START));
        let policy = RateLimitPolicy::new(1, 60).unwrap();

        rate_limit_middleware(&limiter, &HeaderMap::new(), &policy, Some("user-1")).unwrap();
        let rejection =
            rate_limit_middleware(&limiter, &HeaderMap::new(), &policy, Some("user-1")).unwrap_err();

        let json = serde_json::to_value(&rejection.body).unwrap();
        assert_eq!(json["error"], "RATE_LIMIT_EXCEEDED");
        assert!(json["message"].is_string());
        assert_eq!(json["resetAt"], "2023-11-14T22:14:20.000Z");
    }

    #[test]
    fn test_explicit_identifier_overrides_ip() {
        let limiter = RateLimiter::with_clock(ManualClock::new(START));
        let policy = RateLimitPolicy::new(1, 60).unwrap();
        let headers = forwarded("203.0.113.1");

        rate_limit_middleware(&limiter, &headers, &policy, Some("user-7")).unwrap();

        assert!(limiter.get_entry("user-7").is_some());
        assert!(limiter.get_entry("203.0.113.1").is_none());
        // The IP still has its own budget
        assert!(rate_limit_middleware(&limiter, &headers, &policy, None).is_ok());
    }

    #[test]
    fn test_empty_identifier_falls_back_to_ip() {
        let limiter = RateLimiter::with_clock(ManualClock::new(START));
        let policy = RateLimitPolicy::new(1, 60).unwrap();
        let headers = forwarded("203.0.113.9");

        rate_limit_middleware(&limiter, &headers, &policy, Some("")).unwrap();

        assert!(limiter.get_entry("").is_none());
        assert!(limiter.get_entry("203.0.113.9").is_some());
        assert!(rate_limit_middleware(&limiter, &headers, &policy, Some("  ")).is_err());
    }

    #[test]
    fn test_unknown_clients_share_a_bucket() {
        let limiter = RateLimiter::with_clock(ManualClock::new(START));
        let policy = RateLimitPolicy::new(1, 60).unwrap();

        assert!(rate_limit_middleware(&limiter, &HeaderMap::new(), &policy, None).is_ok());
        assert!(rate_limit_middleware(&limiter, &HeaderMap::new(), &policy, None).is_err());
    }

    #[test]
    fn test_retry_after_at_reset_boundary() {
        let clock = ManualClock::new(START);
        let limiter = RateLimiter::with_clock(clock.clone());
        let config = RateLimitConfig::new(1, 60, "edge");

        check(&limiter, &config).unwrap();
        clock.advance(Duration::from_secs(60));
        let rejection = check(&limiter, &config).unwrap_err();
        assert_eq!(rejection.retry_after_secs, 0);
    }
}
