//! Fixed-window rate limiting held in process memory.

mod client_ip;
mod clock;
mod entry;
mod limiter;
mod middleware;
pub mod policies;
mod sweeper;

pub use client_ip::{get_client_ip, UNKNOWN_CLIENT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{RateLimitConfig, RateLimitEntry, RateLimitResult};
pub use limiter::RateLimiter;
pub use middleware::{
    check, rate_limit_headers, rate_limit_middleware, RateLimitRejection, RejectionBody,
    RATE_LIMIT_EXCEEDED, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use policies::{RateLimitPolicies, RateLimitPolicy};
pub use sweeper::{Sweeper, SweeperHandle};
