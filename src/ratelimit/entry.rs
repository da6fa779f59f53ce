//! Rate limit entries, per-call parameters and results.

use serde::{Deserialize, Serialize};

/// Counter state for one identifier within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests observed in the current window
    pub count: u32,
    /// Epoch milliseconds at which the window expires
    pub reset_at: u64,
}

impl RateLimitEntry {
    /// Open a new window at `now_ms` holding one request.
    pub fn open(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_at: now_ms.saturating_add(window_ms),
        }
    }

    /// Whether `reset_at` has passed at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.reset_at
    }
}

/// Parameters for a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed per window
    pub max_requests: u32,
    /// Window duration in seconds
    pub window_seconds: u64,
    /// Key the budget is tracked under (IP address, user id, ...)
    pub identifier: String,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_seconds: u64, identifier: impl Into<String>) -> Self {
        Self {
            max_requests,
            window_seconds,
            identifier: identifier.into(),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_seconds.saturating_mul(1000)
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// Whether the request is admitted
    pub success: bool,
    /// The configured maximum
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Epoch milliseconds at which the window expires
    pub reset_at: u64,
}
