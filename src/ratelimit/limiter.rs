//! Core fixed-window rate limiter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::entry::{RateLimitConfig, RateLimitEntry, RateLimitResult};

/// An in-process fixed-window rate limiter.
///
/// Each identifier owns at most one live [`RateLimitEntry`]. The
/// lookup, comparison and increment for an identifier happen while holding
/// that identifier's shard lock, so concurrent checks for the same
/// identifier cannot both take the last slot of a window.
///
/// State is local to the process: separate instances behind a load balancer
/// each enforce their own budget, so the effective global limit is
/// `max_requests * instances`.
pub struct RateLimiter<C = SystemClock> {
    /// Live windows indexed by identifier
    entries: DashMap<String, RateLimitEntry>,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter driven by the given clock.
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Check and consume budget for `config.identifier`.
    ///
    /// A rejected call does not increment the counter, so repeated probing
    /// of an exhausted window never pushes its reset time out.
    pub fn check_rate_limit(&self, config: &RateLimitConfig) -> RateLimitResult {
        let now = self.clock.now_ms();
        let limit = config.max_requests;

        trace!(
            identifier = %config.identifier,
            limit = limit,
            window_seconds = config.window_seconds,
            "Checking rate limit"
        );

        match self.entries.entry(config.identifier.clone()) {
            Entry::Vacant(vacant) => {
                let entry = vacant.insert(RateLimitEntry::open(now, config.window_ms()));
                debug!(identifier = %config.identifier, reset_at = entry.reset_at, "Opened rate limit window");
                Self::admitted(limit, 1, entry.reset_at)
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();

                if entry.is_expired(now) {
                    *entry = RateLimitEntry::open(now, config.window_ms());
                    debug!(identifier = %config.identifier, reset_at = entry.reset_at, "Reopened expired rate limit window");
                    return Self::admitted(limit, 1, entry.reset_at);
                }

                if entry.count >= limit {
                    debug!(
                        identifier = %config.identifier,
                        count = entry.count,
                        limit = limit,
                        "Rate limit exceeded"
                    );
                    return RateLimitResult {
                        success: false,
                        limit,
                        remaining: 0,
                        reset_at: entry.reset_at,
                    };
                }

                entry.count += 1;
                Self::admitted(limit, entry.count, entry.reset_at)
            }
        }
    }

    fn admitted(limit: u32, count: u32, reset_at: u64) -> RateLimitResult {
        // A zero limit still records the opening request but never admits it.
        RateLimitResult {
            success: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at,
        }
    }

    /// Remove every entry whose window has expired.
    ///
    /// Returns the number of entries removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before.saturating_sub(self.entries.len());

        if evicted > 0 {
            debug!(evicted = evicted, remaining = self.entries.len(), "Evicted expired rate limit entries");
        }

        evicted
    }

    /// Get a copy of the stored entry for an identifier, expired or not.
    pub fn get_entry(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries.get(identifier).map(|entry| *entry)
    }

    /// Get the number of stored entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current time according to this limiter's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
