//! Retry classification and backoff for billing API calls.

use std::time::Duration;

use rand::Rng;
use reqwest::{Response, StatusCode};

use super::error::BillingError;
use crate::config::BackoffConfig;

/// Statuses worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Whether a response status should be retried.
pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

/// Outcome of one attempt.
pub(crate) enum Attempt {
    /// A 2xx response
    Success(Response),
    /// A retryable status, kept so its body can be read if no attempts remain
    RetryableStatus(Response),
    /// A timeout or transport failure
    RetryableError(BillingError),
    /// Any other status
    Terminal(Response),
}

impl Attempt {
    /// Classify the result of sending a request.
    pub(crate) fn classify(result: Result<Response, BillingError>) -> Self {
        match result {
            Ok(response) if response.status().is_success() => Attempt::Success(response),
            Ok(response) if is_retryable_status(response.status()) => {
                Attempt::RetryableStatus(response)
            }
            Ok(response) => Attempt::Terminal(response),
            Err(err) => Attempt::RetryableError(err),
        }
    }
}

impl BackoffConfig {
    /// Delay before the attempt following zero-based `attempt`, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponential = 2u64
            .checked_pow(attempt)
            .and_then(|factor| self.base_delay_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }

    /// Delay before the attempt following zero-based `attempt`, with jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.max_jitter_ms)
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }
}
