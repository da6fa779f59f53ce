//! Resilient client for the external billing API.
//!
//! [`BillingClient::request`] bounds each attempt with a timeout and retries
//! transient failures (408, 429, 500, 502, 503, 504, timeouts and transport
//! errors) with exponential backoff plus jitter. The payment and subscription
//! operations in [`BillingApi`] are thin wrappers over it.

mod client;
mod error;
mod operations;
mod retry;
mod types;

pub use client::{BillingClient, RequestOptions};
pub use error::{BillingError, MAX_ERROR_BODY_CHARS};
pub use operations::BillingApi;
pub use retry::{is_retryable_status, RETRYABLE_STATUSES};
pub use types::{AutoRecurring, FrequencyType, NewSubscription, SubscriptionStatus};
