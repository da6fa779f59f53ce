//! Payment and subscription operations on the billing API.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::client::{BillingClient, RequestOptions};
use super::error::BillingError;
use super::types::{NewSubscription, SubscriptionStatus};

const X_IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("x-idempotency-key");

/// Retries for reads, which are always safe to repeat.
const READ_RETRIES: u32 = 2;
/// Retries for writes; creation is guarded by an idempotency key.
const WRITE_RETRIES: u32 = 1;

/// Billing operations used by the HTTP layer.
///
/// Implemented by [`BillingClient`]; tests substitute their own.
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Fetch a payment record.
    async fn get_payment(&self, payment_id: &str) -> Result<Value, BillingError>;

    /// Fetch a subscription record.
    async fn get_subscription(&self, subscription_id: &str) -> Result<Value, BillingError>;

    /// Create a subscription.
    async fn create_subscription(&self, subscription: &NewSubscription) -> Result<Value, BillingError>;

    /// Change a subscription's status.
    async fn update_subscription_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Value, BillingError>;

    /// Cancel a subscription.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<Value, BillingError> {
        self.update_subscription_status(subscription_id, SubscriptionStatus::Cancelled)
            .await
    }
}

/// Reject identifiers that could escape their path segment.
fn resource_id(id: &str) -> Result<&str, BillingError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(BillingError::InvalidId(id.to_string()))
    }
}

#[async_trait]
impl BillingApi for BillingClient {
    #[instrument(skip(self))]
    async fn get_payment(&self, payment_id: &str) -> Result<Value, BillingError> {
        let endpoint = format!("/v1/payments/{}", resource_id(payment_id)?);
        self.request_json(&endpoint, RequestOptions::get().with_retries(READ_RETRIES))
            .await
    }

    #[instrument(skip(self))]
    async fn get_subscription(&self, subscription_id: &str) -> Result<Value, BillingError> {
        let endpoint = format!("/preapproval/{}", resource_id(subscription_id)?);
        self.request_json(&endpoint, RequestOptions::get().with_retries(READ_RETRIES))
            .await
    }

    #[instrument(skip(self, subscription), fields(reason = %subscription.reason))]
    async fn create_subscription(&self, subscription: &NewSubscription) -> Result<Value, BillingError> {
        let body = serde_json::to_value(subscription)
            .map_err(|e| BillingError::InvalidBody(e.to_string()))?;

        // Same key on every attempt so a retried create is applied once.
        let idempotency_key = uuid::Uuid::new_v4().to_string();
        let key_value = HeaderValue::from_str(&idempotency_key)
            .map_err(|_| BillingError::InvalidHeader(X_IDEMPOTENCY_KEY.to_string()))?;

        let options = RequestOptions::post(body)
            .with_header(X_IDEMPOTENCY_KEY, key_value)
            .with_retries(WRITE_RETRIES);

        let created: Value = self.request_json("/preapproval", options).await?;
        let subscription_id = created.get("id").and_then(|id| id.as_str()).unwrap_or_default();
        info!(subscription_id = subscription_id, "Subscription created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn update_subscription_status(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Value, BillingError> {
        let endpoint = format!("/preapproval/{}", resource_id(subscription_id)?);
        let options = RequestOptions::put(json!({ "status": status })).with_retries(WRITE_RETRIES);

        let updated = self.request_json(&endpoint, options).await?;
        info!(subscription_id = subscription_id, status = %status, "Subscription status updated");
        Ok(updated)
    }
}
